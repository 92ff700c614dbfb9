use anyhow::Result;

fn main() -> Result<()> {
    patternbox::cli::run()
}
