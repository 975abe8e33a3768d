//! Graceful shutdown: Ctrl-C cancels the root token

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first SIGINT/Ctrl-C.
///
/// Must be called from within a tokio runtime. The listener task exits quietly
/// if the token is cancelled for another reason first; await the returned
/// handle after cancelling to make sure it is gone.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    log::warn!("Interrupt received, cancelling pipeline");
                    token.cancel();
                }
                Err(e) => log::warn!("Cannot listen for Ctrl-C: {e}"),
            },
        }
    })
}
