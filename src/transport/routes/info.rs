/// GET /version
pub async fn get_version() -> &'static str {
    tracing::debug!("GET /version");
    env!("CARGO_PKG_VERSION")
}
