use routeguard_schema::{assert, SchemaKind};
use tracing::debug;

use crate::cmd::{read_json, CheckArgs};
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_check_failed, print_check_passed, OutputFormat};

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let kind: SchemaKind = args
        .kind
        .parse()
        .map_err(|err| CliError::new(USAGE, format!("{err}")))?;
    let value = read_json(&args.file)?;
    let context = args.context.as_deref();

    match assert(kind, &value, context) {
        Ok(validated) => {
            print_check_passed(kind, context, &validated, format);
            Ok(SUCCESS)
        }
        Err(err) => {
            debug!(kind = %kind, violations = err.details().len(), "configuration rejected");
            print_check_failed(&err, context, format);
            Ok(DATA_INVALID)
        }
    }
}
