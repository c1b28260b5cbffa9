#[tokio::main]
async fn main() -> anyhow::Result<()> {
    portfolio::start_server().await
}
