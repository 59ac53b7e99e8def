#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    eoffice_server::run().await
}
