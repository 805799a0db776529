//! Text, diagnostics and JSON renderings of an assembled program.

use std::fmt::Write;

use super::Program;
use crate::core::CompileResult;
use crate::target::Instruction;

/// Output renderings of an assembled program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// The loadable artifact text.
    #[default]
    Text,
    /// Annotated diagnostics listing.
    Asm,
    Json,
}

impl Program<'_> {
    pub fn render(&self, format: OutputFormat) -> CompileResult<String> {
        Ok(match format {
            OutputFormat::Text => self.render_text(),
            OutputFormat::Asm => self.render_asm(),
            OutputFormat::Json => self.render_json()?,
        })
    }

    /// The artifact in its loadable text form.
    ///
    /// ```text
    /// start = 0
    /// check = 0
    /// n_vars = 4
    /// n_global_vars = 0
    /// code = [
    /// # main()
    ///     # entry:
    ///          ('store_const', 0, 1, 0) , # 0
    /// ]
    /// ```
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "start = {}", self.start);
        let _ = writeln!(out, "check = {}", self.check);
        let _ = writeln!(out, "n_vars = {}", self.n_vars);
        let _ = writeln!(out, "n_global_vars = {}", self.n_global_vars);
        out.push_str("code = [\n");
        self.render_code(&mut out, |inst, index| {
            format!("\t\t {} , # {}", inst.to_artifact(), index)
        });
        out.push_str("]\n");
        out
    }

    /// Diagnostics listing with annotated descriptors; not machine-parseable.
    pub fn render_asm(&self) -> String {
        let mut out = String::new();
        self.render_code(&mut out, |inst, index| {
            format!("\t\t {} # {}", inst.to_annotated(), index)
        });
        out
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_artifact())
    }

    fn render_code(&self, out: &mut String, line: impl Fn(&Instruction, u32) -> String) {
        for function in &self.functions {
            let _ = writeln!(out, "# {}()", function.name);
            for block in function.blocks.iter().filter(|b| !b.redundant && !b.is_empty()) {
                let _ = writeln!(out, "\t# {}:", block.name);
                let base = function.start + block.offset.unwrap_or(0);
                for (i, inst) in block.code.iter().enumerate() {
                    out.push_str(&line(inst, base + i as u32));
                    out.push('\n');
                }
            }
        }
    }
}
