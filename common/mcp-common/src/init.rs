//! Server initialization utilities
//!
//! Tracing setup and the `serve_stdio!` macro used by the server binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing target for security decisions (allow / warn / block and execution
/// results). Kept separate so operators can route or filter it on its own,
/// e.g. `RUST_LOG=audit=info,adb_guard_mcp=warn`.
pub const AUDIT_TARGET: &str = "audit";

/// Initialize tracing for an MCP server
///
/// Logs go to stderr (stdout is reserved for the MCP protocol). `RUST_LOG`
/// is honoured; on top of it the crate and the [`AUDIT_TARGET`] default to
/// `info` so the audit trail is never silently filtered out.
///
/// Set `LOG_FORMAT=json` for structured JSON lines.
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("{crate_name}=info").parse()?)
        .add_directive(format!("{AUDIT_TARGET}=info").parse()?);

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}

/// Generate `main` for an MCP server served over stdio
///
/// The server type must provide `fn try_new() -> Result<Self, E>` where `E`
/// converts into `anyhow::Error`, so a broken configuration stops start-up
/// with a readable error instead of a panic.
///
/// ```rust,ignore
/// mcp_common::serve_stdio!(AdbGuardServer, "adb_guard_mcp");
/// ```
#[macro_export]
macro_rules! serve_stdio {
    ($server_type:ty, $crate_name:expr) => {
        #[tokio::main]
        async fn main() -> anyhow::Result<()> {
            use rmcp::ServiceExt;

            $crate::init_tracing($crate_name)?;

            tracing::info!(concat!("Starting ", $crate_name, " MCP Server"));

            let server = <$server_type>::try_new()?;
            let service = server.serve(rmcp::transport::stdio()).await?;

            tracing::info!("Server running, waiting for requests...");

            service.waiting().await?;

            tracing::info!("Server shutting down");
            Ok(())
        }
    };
}
