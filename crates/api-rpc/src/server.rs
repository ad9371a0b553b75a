//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP on a local TCP port.

use crate::handler::RpcHandler;
use crate::types::{JobRef, ListRunsRequest, RunRef, UpdateJobRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use netops_core::application::{AutomationService, NewJob, QuickTask};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9531;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

/// Register one params -> handler method
fn register<P, R, F, Fut>(
    module: &mut RpcModule<()>,
    method: &'static str,
    handler: &Arc<RpcHandler>,
    call: F,
) -> Result<(), String>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Clone + Send + 'static,
    F: Fn(Arc<RpcHandler>, P) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ErrorObjectOwned>> + Send + 'static,
{
    let handler = handler.clone();
    module
        .register_async_method(method, move |params, _, _| {
            let handler = handler.clone();
            let call = call.clone();
            async move {
                let req: P = params.parse()?;
                call(handler, req).await
            }
        })
        .map_err(|e| e.to_string())?;
    Ok(())
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, service: Arc<AutomationService>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(service)),
        }
    }

    /// Method table
    pub fn module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());
        let h = &self.handler;

        register(&mut module, "automation.job.create.v1", h, |h, req: NewJob| async move {
            h.create_job(req).await
        })?;
        register(&mut module, "automation.job.get.v1", h, |h, req: JobRef| async move {
            h.get_job(req).await
        })?;
        register(
            &mut module,
            "automation.job.list.v1",
            h,
            |h, _: Option<serde_json::Value>| async move { h.list_jobs().await },
        )?;
        register(
            &mut module,
            "automation.job.update.v1",
            h,
            |h, req: UpdateJobRequest| async move { h.update_job(req).await },
        )?;
        register(&mut module, "automation.job.delete.v1", h, |h, req: JobRef| async move {
            h.delete_job(req).await
        })?;
        register(&mut module, "automation.job.run.v1", h, |h, req: JobRef| async move {
            h.run_now(req).await
        })?;
        register(
            &mut module,
            "automation.quick_task.v1",
            h,
            |h, req: QuickTask| async move { h.quick_task(req).await },
        )?;
        register(&mut module, "automation.run.get.v1", h, |h, req: RunRef| async move {
            h.get_run(req).await
        })?;
        register(
            &mut module,
            "automation.run.list.v1",
            h,
            |h, req: Option<ListRunsRequest>| async move {
                h.list_runs(req.unwrap_or_default()).await
            },
        )?;
        register(&mut module, "automation.run.delete.v1", h, |h, req: RunRef| async move {
            h.delete_run(req).await
        })?;
        register(
            &mut module,
            "automation.run.summary.v1",
            h,
            |h, req: RunRef| async move { h.run_summary(req).await },
        )?;
        register(
            &mut module,
            "automation.inventory.summary.v1",
            h,
            |h, _: Option<serde_json::Value>| async move { h.fleet_summary().await },
        )?;
        register(
            &mut module,
            "system.health.v1",
            h,
            |h, _: Option<serde_json::Value>| async move { Ok(h.health()) },
        )?;

        Ok(module)
    }

    /// Start the JSON-RPC server; returns the bound address and its handle
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server.local_addr().map_err(|e| e.to_string())?;

        let module = self.module()?;
        let methods = module.method_names().count();
        let handle = server.start(module);

        info!(addr = %local_addr, methods, "JSON-RPC server started");
        Ok((local_addr, handle))
    }
}
