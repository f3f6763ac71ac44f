use std::fs;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Write the kb-access OpenAPI document to disk", long_about = None)]
struct Args {
    /// Destination file
    #[arg(long, default_value = "openapi.json")]
    out: String,
    /// Port advertised in the `servers` entry
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let doc = kb_access::docs::build_openapi(args.port)?;
    fs::write(&args.out, serde_json::to_string_pretty(&doc)?)?;
    println!("wrote {}", args.out);
    Ok(())
}
