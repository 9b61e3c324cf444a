#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rainchat_lib::run().await
}
