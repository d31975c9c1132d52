//! Worker side of the isolation protocol.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use super::protocol::{WorkerFailure, WorkerOutcome, WorkerReply, WorkerRequest};
use crate::tempfiles::{ScopeLease, TempStore};
use crate::transform::TransformRegistry;

/// Runs one request under a fresh scope and reports what it reserved.
///
/// Blocking. Reserved paths are handed back rather than deleted, even when
/// the transform fails or panics.
pub fn execute_request(registry: &TransformRegistry, request: WorkerRequest) -> WorkerReply {
    let Some(transform) = registry.get(&request.transform) else {
        return WorkerReply::failed(WorkerFailure::internal(format!(
            "Unknown transform '{}'",
            request.transform
        )));
    };

    let store = TempStore::attach(&request.temp_dir);
    let lease = ScopeLease::new();
    let mut scope = match store.open_scope(&lease) {
        Ok(scope) => scope,
        Err(e) => return WorkerReply::failed(WorkerFailure::internal(e.to_string())),
    };

    info!(transform = %request.transform, inputs = request.inputs.len(), "Worker running transform");
    let result = catch_unwind(AssertUnwindSafe(|| {
        transform.run(&request.inputs, &request.args, &mut scope)
    }));

    let outcome = match result {
        Ok(Ok(output)) => WorkerOutcome::Ok(output),
        Ok(Err(e)) => WorkerOutcome::Err(WorkerFailure::from(&e)),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(transform = %request.transform, %message, "Transform panicked");
            WorkerOutcome::Err(WorkerFailure::internal(format!(
                "Transform '{}' panicked: {}",
                request.transform, message
            )))
        }
    };

    WorkerReply {
        outcome,
        reserved: scope.detach(),
    }
}

/// Serves one request read from `reader`, writing the reply to `writer`.
pub async fn serve_worker<R, W>(
    registry: TransformRegistry,
    mut reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut input = Vec::new();
    reader.read_to_end(&mut input).await?;

    let reply = match serde_json::from_slice::<WorkerRequest>(&input) {
        Ok(request) => tokio::task::spawn_blocking(move || execute_request(&registry, request))
            .await
            .unwrap_or_else(|e| WorkerReply::failed(WorkerFailure::internal(e.to_string()))),
        Err(e) => WorkerReply::failed(WorkerFailure::internal(format!(
            "Malformed worker request: {}",
            e
        ))),
    };

    let mut bytes = serde_json::to_vec(&reply).map_err(std::io::Error::other)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}
