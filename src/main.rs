#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kb_qa_lib::run().await
}
