mod app;
mod config;
mod local_logger;
mod prelude;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    match crate::app::run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    }
}
