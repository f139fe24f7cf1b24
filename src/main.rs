fn main() {
    #[cfg(feature = "cli")]
    deltabridge::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("deltabridge: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
