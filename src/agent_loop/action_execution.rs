use super::helpers::{ActionRequest, millis_to_u64};
use crate::actions::ActionHandle;
use crate::error::{AgentError, Result};
use crate::events::{AgentEvent, EventSink};
use crate::types::ActionOutcome;
use futures::future::join_all;
use log::{debug, warn};
use std::time::Instant;

/// Execute the requests of one step.
///
/// Results come back in request order. Sequential execution stops after the
/// first fatal failure, so the result list may be shorter than `requests`.
pub(super) async fn execute_requests(
    handles: &[ActionHandle],
    requests: &[ActionRequest],
    parallel: bool,
    events: &EventSink,
) -> Vec<Result<String>> {
    if parallel {
        return join_all(
            requests
                .iter()
                .map(|request| execute_request(handles, request, events)),
        )
        .await;
    }

    let mut results = Vec::with_capacity(requests.len());
    for request in requests {
        let result = execute_request(handles, request, events).await;
        let fatal = matches!(&result, Err(e) if !e.is_recoverable());
        results.push(result);
        if fatal {
            break;
        }
    }
    results
}

async fn execute_request(
    handles: &[ActionHandle],
    request: &ActionRequest,
    events: &EventSink,
) -> Result<String> {
    events
        .emit(AgentEvent::action_start(
            &request.id,
            &request.name,
            request.input.clone(),
        ))
        .await;

    let start = Instant::now();
    let result = match handles.iter().find(|h| h.name() == request.name) {
        Some(handle) => handle.invoke(&request.input).await,
        None => Err(AgentError::ActionNotFound(request.name.clone())),
    };
    let duration_ms = millis_to_u64(start.elapsed().as_millis());

    let outcome = match &result {
        Ok(output) => {
            debug!("action {} succeeded in {duration_ms}ms", request.name);
            ActionOutcome::success(output)
        }
        Err(e) => {
            warn!("action {} failed ({}): {e}", request.name, e.kind());
            ActionOutcome::failure(e)
        }
    }
    .with_duration(duration_ms);

    events
        .emit(AgentEvent::action_end(&request.id, &request.name, outcome))
        .await;

    result
}
