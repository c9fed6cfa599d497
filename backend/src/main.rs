#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agriqual::start_server().await
}
