#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod span;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod stream;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod token;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod tokenizer;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod lexer;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod ast;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod parser;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod types;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod trigger;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod symbol;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod scope;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod precheck;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod typeck;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod opcode;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod ir;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod locals;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod switch;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod codegen;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod optimize;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod link;

use serde::Serialize;
use tracing::debug;

use codegen::BinaryScript;
use error::{CollectingReporter, CompileError};
use opcode::InstructionMap;
use optimize::Optimizer;
use symbol::SymbolTable;
use token::LexicalTable;

/// Pipeline switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Arrays a single script may declare.
    pub array_budget: usize,
    pub optimize: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            array_budget: scope::DEFAULT_ARRAY_BUDGET,
            optimize: true,
        }
    }
}

/// One named source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// A compile error and the file it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file: String,
    pub error: CompileError,
}

#[derive(Debug, Default, Serialize)]
pub struct CompileOutput {
    pub scripts: Vec<BinaryScript>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutput {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Drives source files through every stage:
/// parse → register scripts → type check → generate → optimize.
///
/// Scripts of all files share one sub table of `symbols`, so a file may
/// call into another. Stages after parsing still run when an earlier file
/// had errors; only error free scripts reach code generation.
pub struct Compiler<'s> {
    symbols: &'s SymbolTable<'s>,
    lexical: LexicalTable,
    map: InstructionMap,
    options: CompilerOptions,
}

impl<'s> Compiler<'s> {
    pub fn new(symbols: &'s SymbolTable<'s>, map: InstructionMap, options: CompilerOptions) -> Self {
        Self {
            symbols,
            lexical: LexicalTable::default(),
            map,
            options,
        }
    }

    pub fn instruction_map(&self) -> &InstructionMap {
        &self.map
    }

    pub fn compile(&self, sources: &[SourceFile]) -> CompileOutput {
        let mut output = CompileOutput::default();
        let mut reporters: Vec<CollectingReporter> =
            sources.iter().map(|_| CollectingReporter::new()).collect();

        let mut trees: Vec<_> = sources
            .iter()
            .zip(reporters.iter_mut())
            .map(|(source, reporter)| {
                let tree = parser::parse_source(&source.text, &self.lexical, reporter);
                debug!(file = %source.name, scripts = tree.scripts().len(), "parsed");
                tree
            })
            .collect();

        let mut scripts = self.symbols.create_sub_table();
        let accepted: Vec<_> = trees
            .iter()
            .zip(reporters.iter_mut())
            .map(|(tree, reporter)| precheck::register_scripts(tree, &mut scripts, reporter))
            .collect();

        for ((tree, reporter), accepted) in trees.iter_mut().zip(reporters.iter_mut()).zip(&accepted) {
            let before = reporter.errors().len();
            typeck::check_scripts(tree, &scripts, reporter, accepted, self.options.array_budget);
            if reporter.errors().len() > before {
                continue;
            }
            output
                .scripts
                .extend(codegen::generate(tree, accepted, &self.map, reporter));
        }
        debug!(scripts = output.scripts.len(), "generated");

        if self.options.optimize {
            let optimizer = Optimizer::with_default_passes(&self.map);
            let removed: usize = output.scripts.iter_mut().map(|s| optimizer.run(s)).sum();
            debug!(removed, "optimized");
        }

        for (source, mut reporter) in sources.iter().zip(reporters) {
            output
                .diagnostics
                .extend(reporter.take().into_iter().map(|error| Diagnostic {
                    file: source.name.clone(),
                    error,
                }));
        }
        output
    }

    /// Compile a single source string.
    pub fn compile_str(&self, source: &str) -> Result<Vec<BinaryScript>, Vec<CompileError>> {
        let output = self.compile(&[SourceFile::new("<input>", source)]);
        if output.has_errors() {
            return Err(output.diagnostics.into_iter().map(|d| d.error).collect());
        }
        Ok(output.scripts)
    }
}
