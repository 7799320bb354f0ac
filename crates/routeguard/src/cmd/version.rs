use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("routeguard {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: routeguard");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("ROUTEGUARD_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("ROUTEGUARD_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("kinds: {}", routeguard_schema::SchemaKind::ALL.len());
    println!("features: validate=true, cli=true");

    Ok(SUCCESS)
}
