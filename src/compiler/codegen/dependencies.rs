//! Dependency-ordered module scheduling.
//!
//! Builds one dependency record per module from its `use` directives, then
//! drives a depth-first walk so every module is lowered after the modules it
//! depends on. Re-entering a module that is still being visited means the
//! `use` graph has a cycle, which is a fatal error naming the modules on the
//! cycle path.

use crate::compiler::ast::{Program, Statement};
use crate::compiler::compiler_errors::{CompileError, ErrorLocation};
use crate::compiler::string_interning::{StringId, StringTable};
use crate::dependency_log;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    Unvisited,
    /// On the current DFS stack; seeing this again is a cycle
    Visiting,
    /// Fully lowered
    Done,
}

/// One record per module, rebuilt for every emission pass
#[derive(Debug)]
pub struct DependencyRecord {
    pub module: StringId,
    /// The module name spelled out, for diagnostics
    pub module_name: String,
    /// Direct dependencies, in `use` order
    pub deps: Vec<(StringId, String)>,
    pub state: VisitState,
}

/// Extract `use` directives from every module body, in program order
pub fn build_dependency_records(
    program: &Program,
    interner: &mut StringTable,
) -> Vec<DependencyRecord> {
    program
        .modules
        .iter()
        .map(|module| {
            let module_id = interner.intern(&module.name);
            // self-imports were already warned about and skipped by the
            // link pass; they are not edges
            let deps = module
                .body
                .iter()
                .filter_map(|stmt| match stmt {
                    Statement::Use { module: target, .. } if *target != module.name => {
                        Some((interner.intern(target), target.clone()))
                    }
                    _ => None,
                })
                .collect();

            DependencyRecord {
                module: module_id,
                module_name: module.name.clone(),
                deps,
                state: VisitState::Unvisited,
            }
        })
        .collect()
}

/// Visit every module depth-first in program order, invoking `lower` for a
/// module only once all of its dependencies have been lowered. Modules at
/// the same depth are visited in program order.
pub fn schedule<F>(records: &mut [DependencyRecord], lower: &mut F) -> Result<(), CompileError>
where
    F: FnMut(StringId) -> Result<(), CompileError>,
{
    let mut path: Vec<usize> = Vec::with_capacity(records.len());

    for index in 0..records.len() {
        visit(records, index, &mut path, lower)?;
    }

    Ok(())
}

fn visit<F>(
    records: &mut [DependencyRecord],
    index: usize,
    path: &mut Vec<usize>,
    lower: &mut F,
) -> Result<(), CompileError>
where
    F: FnMut(StringId) -> Result<(), CompileError>,
{
    match records[index].state {
        VisitState::Done => return Ok(()),
        VisitState::Visiting => {
            return Err(cycle_error(records, index, path));
        }
        VisitState::Unvisited => {}
    }

    records[index].state = VisitState::Visiting;
    path.push(index);

    dependency_log!("visiting module '{}'", records[index].module_name);

    for dep_pos in 0..records[index].deps.len() {
        let dep = records[index].deps[dep_pos].0;

        let Some(dep_index) = records.iter().position(|r| r.module == dep) else {
            let module_name = records[index].module_name.clone();
            let dep_name = records[index].deps[dep_pos].1.clone();
            return Err(CompileError::rule_error(
                format!("Module '{module_name}' depends on '{dep_name}', which does not exist"),
                ErrorLocation::in_module(module_name),
            ));
        };

        visit(records, dep_index, path, lower)?;
    }

    // children are done, lower this module
    lower(records[index].module)?;

    path.pop();
    records[index].state = VisitState::Done;

    Ok(())
}

/// Report a dependency cycle, naming every module from the first occurrence
/// of the re-entered module to the point of re-entry.
fn cycle_error(records: &[DependencyRecord], reentered: usize, path: &[usize]) -> CompileError {
    let start = path.iter().position(|&i| i == reentered).unwrap_or(0);
    let mut names: Vec<&str> = path[start..]
        .iter()
        .map(|&i| records[i].module_name.as_str())
        .collect();
    names.push(&records[reentered].module_name);

    CompileError::rule_error(
        format!("Circular dependency between modules: {}", names.join(" -> ")),
        ErrorLocation::in_module(&records[reentered].module_name),
    )
}
