use crate::config::ControllerConfig;
use crate::framework::{ControlError, ResourceClient, ResourceController, Result, TypeRegistry};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The running process: the controller task and a client wired to it.
///
/// # Example
///
/// ```ignore
/// let testbed = Testbed::start(Arc::new(registry), &config.controller);
/// let garage = testbed.client().create_root("garage", CreateOptions::new()).await?;
/// // ... drive resources ...
/// testbed.shutdown().await?;
/// ```
pub struct Testbed {
    client: ResourceClient,
    handle: JoinHandle<()>,
}

impl Testbed {
    /// Spawns the controller. The registry is frozen from here on.
    pub fn start(registry: Arc<TypeRegistry>, config: &ControllerConfig) -> Self {
        let (controller, client) = ResourceController::new(registry, config.mailbox);
        let controller = controller.with_tombstone_limit(config.tombstones);
        let handle = tokio::spawn(controller.run());
        Self { client, handle }
    }

    pub fn client(&self) -> &ResourceClient {
        &self.client
    }

    /// Releases every top-level resource, then closes the mailbox and waits for the
    /// controller to exit.
    pub async fn shutdown(self) -> Result<usize> {
        info!("Shutting down testbed...");
        let released = self.client.release_all().await?;

        // Dropping the last client closes the mailbox, which ends the controller loop.
        drop(self.client);
        if let Err(e) = self.handle.await {
            error!("Controller task failed: {:?}", e);
            return Err(ControlError::failed(format!("controller task failed: {e}")));
        }

        info!(released, "Testbed shutdown complete.");
        Ok(released)
    }

    /// Waits for SIGINT or SIGTERM, then shuts down.
    pub async fn run_until_signal(self) -> Result<usize> {
        wait_for_signal().await;
        self.shutdown().await
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
