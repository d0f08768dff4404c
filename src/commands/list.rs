//! `list`: table of running solver instances

use super::ListArgs;
use crate::core::discovery::{Discovery, SolverMatcher};
use crate::core::models::InstanceDescriptor;
use crate::error::WardenResult;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use tracing::debug;

pub fn execute(args: &ListArgs, matcher: SolverMatcher) -> WardenResult<()> {
    let discovery = Discovery::system().with_matcher(matcher);
    debug!(patterns = ?discovery.matcher().patterns(), "listing solver instances");
    let instances = discovery.list_instances()?;
    let visible: Vec<InstanceDescriptor> = instances
        .into_iter()
        .filter(|instance| !args.instances || instance.is_instance)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&visible)?);
        return Ok(());
    }

    if visible.is_empty() {
        println!("{}", "No MAPDL instances found".yellow());
        return Ok(());
    }

    build_table(&visible, args).printstd();
    Ok(())
}

pub fn headers(args: &ListArgs) -> Vec<&'static str> {
    let mut headers = vec!["Name"];
    if !args.instances {
        headers.push("Is Instance");
    }
    headers.extend(["Status", "gRPC port", "PID"]);
    if args.show_cmd() {
        headers.push("Command line");
    }
    if args.show_location() {
        headers.push("Working directory");
    }
    headers
}

pub fn build_table(instances: &[InstanceDescriptor], args: &ListArgs) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(
        headers(args)
            .into_iter()
            .map(|header| Cell::new(header).style_spec("b"))
            .collect(),
    ));

    for instance in instances {
        let mut cells = vec![Cell::new(&instance.name)];
        if !args.instances {
            cells.push(Cell::new(if instance.is_instance { "True" } else { "False" }));
        }
        cells.push(Cell::new(instance.status.as_str()));
        cells.push(Cell::new(&instance.port.to_string()));
        cells.push(Cell::new(&instance.pid.to_string()));
        if args.show_cmd() {
            cells.push(Cell::new(&instance.command_line()));
        }
        if args.show_location() {
            cells.push(Cell::new(&instance.cwd));
        }
        table.add_row(Row::new(cells));
    }

    table
}
