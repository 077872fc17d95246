fn main() -> anyhow::Result<()> {
    revbench_cli::run()
}
