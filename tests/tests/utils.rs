use mock_service::prelude::*;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("stampede=debug,crud_load=debug,mock_service=info")
            .try_init();
    });
}

/// Serve a fresh mock service on an ephemeral port and return its base URL.
#[allow(unused)]
pub async fn spawn_service(state: ServiceState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Err(err) = mock_service::serve(listener, state).await {
            error!("Mock service stopped: {err}");
        }
    });
    format!("http://{addr}")
}
