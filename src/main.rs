fn main() -> anyhow::Result<()> {
    bedwatch_lib::run()
}
