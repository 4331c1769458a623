fn main() -> anyhow::Result<()> {
    bar_pos_lib::run()
}
