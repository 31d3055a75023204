use git_migrator::{exit_code, git_migrator_main};
use std::process::exit;

#[tokio::main]
async fn main() {
    eprintln!(concat!(
        env!("CARGO_PKG_NAME"),
        " ",
        env!("CARGO_PKG_VERSION")
    ));
    let result = git_migrator_main().await;
    if let Err(e) = &result {
        eprintln!("{e}");
    }
    exit(exit_code(&result));
}
