//! First semantic pass: validate script headers and register signatures.

use std::collections::HashSet;

use tracing::debug;

use super::ast::{NodeId, NodeKind, SyntaxTree};
use super::error::{CompileError, ErrorReporter};
use super::symbol::{ScriptInfo, SymbolTable};
use super::trigger::TriggerType;

/// Register the signature of every script in `tree`.
///
/// Returns the scripts that were accepted, in source order. A script whose
/// header is invalid, or whose `(trigger, name)` is already taken, is left
/// out so the later passes never see it; the first definition wins.
pub fn register_scripts(
    tree: &SyntaxTree,
    symbols: &mut SymbolTable<'_>,
    reporter: &mut dyn ErrorReporter,
) -> Vec<NodeId> {
    let mut accepted = Vec::new();
    for &script in tree.scripts() {
        if reporter.halted() {
            break;
        }
        if let Some(info) = check_header(tree, script, reporter) {
            let label = info.full_name();
            match symbols.define_script(info) {
                Ok(()) => accepted.push(script),
                Err(_) => reporter.report(
                    CompileError::semantic(
                        format!("Script {label} is already defined"),
                        tree.span(script),
                    )
                    .in_script(Some(label)),
                ),
            }
        }
    }
    debug!(
        registered = accepted.len(),
        total = tree.scripts().len(),
        "registered script signatures"
    );
    accepted
}

fn check_header(
    tree: &SyntaxTree,
    script: NodeId,
    reporter: &mut dyn ErrorReporter,
) -> Option<ScriptInfo> {
    let view = tree.script(script)?;
    let label = Some(format!("[{},{}]", view.trigger, view.name));
    let mut valid = true;
    let mut report = |message: String, node: NodeId| {
        reporter.report(CompileError::semantic(message, tree.span(node)).in_script(label.clone()));
    };

    let mut seen = HashSet::new();
    let mut id = None;
    for &annotation in &view.annotations {
        if let NodeKind::Annotation { name, value } = tree.kind(annotation) {
            if !seen.insert(name.as_str()) {
                report(format!("Duplicate annotation '#{name}'"), annotation);
                valid = false;
            } else if name == "id" {
                id = Some(*value);
            }
        }
    }

    let Some(trigger) = TriggerType::for_representation(view.trigger) else {
        report(format!("Unknown trigger type '{}'", view.trigger), script);
        return None;
    };

    let mut arguments = Vec::new();
    for &parameter in &view.parameters {
        if let NodeKind::Parameter { ty, name } = tree.kind(parameter) {
            if ty.stack_type().is_none() {
                report(format!("Parameter ${name} cannot have type {ty}"), parameter);
                valid = false;
            }
            arguments.push(ty.clone());
        }
    }
    if !arguments.is_empty() && !trigger.has_arguments() {
        report(format!("Scripts of trigger '{trigger}' cannot take parameters"), script);
        valid = false;
    }
    if !view.return_type.is_void() && !trigger.has_returns() {
        report(format!("Scripts of trigger '{trigger}' cannot return values"), script);
        valid = false;
    }

    valid.then(|| ScriptInfo {
        name: view.name.to_string(),
        id,
        trigger,
        return_type: view.return_type.clone(),
        arguments,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::compiler::error::CollectingReporter;
    use crate::compiler::parser::parse_source;
    use crate::compiler::token::LexicalTable;

    fn register(source: &str) -> (Vec<NodeId>, SymbolTable<'static>, Vec<CompileError>) {
        let table = LexicalTable::default();
        let mut reporter = CollectingReporter::new();
        let tree = parse_source(source, &table, &mut reporter);
        assert!(!reporter.has_errors());
        let mut symbols = SymbolTable::new();
        let accepted = register_scripts(&tree, &mut symbols, &mut reporter);
        (accepted, symbols, reporter.take())
    }

    #[test]
    fn single_script_registers() {
        let (accepted, symbols, errors) = register("[proc,test]");
        assert!(errors.is_empty());
        assert_eq!(accepted.len(), 1);
        assert_eq!(symbols.scripts().count(), 1);
        let info = symbols.lookup_script(TriggerType::Proc, "test").unwrap();
        assert!(info.return_type.is_void());
        assert_eq!(info.id, None);
    }

    #[test]
    fn id_annotation_predefines_script_id() {
        let (_, symbols, errors) = register("#id:37 [clientscript,menu]");
        assert!(errors.is_empty());
        let info = symbols.lookup_script(TriggerType::ClientScript, "menu").unwrap();
        assert_eq!(info.id, Some(37));
    }

    #[test]
    fn duplicate_script_first_wins() {
        let (accepted, symbols, errors) = register("[proc,test](int $a) [proc,test](string $b)");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].script.as_deref(), Some("[proc,test]"));
        assert_eq!(accepted.len(), 1);
        assert_eq!(symbols.scripts().count(), 1);
        let info = symbols.lookup_script(TriggerType::Proc, "test").unwrap();
        assert_eq!(info.arguments, vec![Type::INT]);
    }

    #[test]
    fn same_name_different_trigger_is_fine() {
        let (accepted, _, errors) = register("[proc,a] [label,a]");
        assert!(errors.is_empty());
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn header_violations() {
        let (accepted, _, errors) = register("[timer,a] [label,b](int) [proc,c] #x:1 #x:2 [proc,d]");
        assert_eq!(errors.len(), 3);
        assert!(errors[0].message.contains("Unknown trigger"));
        assert!(errors[1].message.contains("cannot return"));
        assert!(errors[2].message.contains("Duplicate annotation"));
        // only [proc,c] survives
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn signature_records_arguments_and_returns() {
        let (_, symbols, errors) = register("[proc,f](int $a, string $b)(long, boolean)");
        assert!(errors.is_empty());
        let info = symbols.lookup_script(TriggerType::Proc, "f").unwrap();
        assert_eq!(info.arguments, vec![Type::INT, Type::STRING]);
        assert_eq!(info.return_type, Type::tuple([Type::LONG, Type::BOOL]));
    }
}
