use clap::Parser;

fn main() -> cpreproc::error::Result<()> {
    env_logger::init();
    let args = cpreproc::Args::parse();

    let stdout = std::io::stdout();
    cpreproc::run(stdout, args)
}
