use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "electivas_backend=info,tower_http=info";

/// `RUST_LOG` directives when they parse, the crate defaults otherwise.
fn log_filter(raw: Option<&str>) -> EnvFilter {
    raw.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs the global fmt subscriber on stderr, leaving stdout to operator
/// command output. Later calls keep the first subscriber.
pub fn init_tracing() {
    let filter = log_filter(std::env::var("RUST_LOG").ok().as_deref());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
