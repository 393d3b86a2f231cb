#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keyscan::node::run_cli().await
}
