use anyhow::Result;

fn main() -> Result<()> {
    rdfdocs_cli::run()
}
