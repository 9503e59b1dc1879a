//! Enjoy Rust-like diagnostics, minus the source code!
//!
//! The optimizer has no source text to point at, so diagnostics are rendered
//! against the IR listing itself, with the offending instruction highlighted.

use colored::{Color, Colorize};

use crate::ir::{
    error::IrError,
    function::{Function, InstRef},
};

#[derive(Debug, Clone)]
pub struct Diagnostic {
    message: String,
    highlight: Option<InstRef>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            highlight: None,
        }
    }

    pub fn with_highlight(mut self, inst_ref: InstRef) -> Self {
        self.highlight = Some(inst_ref);
        self
    }

    pub fn from_ir_error(error: &IrError) -> Self {
        let diag = Self::new(error.to_string());
        match error.inst() {
            Some(inst_ref) => diag.with_highlight(inst_ref),
            None => diag,
        }
    }

    /// Renders the diagnostic against `function`'s listing. The offending
    /// instruction, if any, gets a red caret line under it.
    pub fn render(&self, function: &Function) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {}\n",
            "error:".color(Color::Red).bold(),
            self.message.clone().bold()
        ));
        let bar = "|".cyan().bold();
        for (block_ref, block) in function.iter_blocks() {
            out.push_str(&format!(" {} {}:\n", bar, block_ref));
            for inst_ref in &block.insts {
                let line = format!("{} = {}", inst_ref, function.inst(*inst_ref));
                if self.highlight == Some(*inst_ref) {
                    out.push_str(&format!(" {}    {}\n", bar, line.color(Color::Red)));
                    out.push_str(&format!(
                        " {}    {}\n",
                        bar,
                        "^".repeat(line.len()).color(Color::Red).bold()
                    ));
                } else {
                    out.push_str(&format!(" {}    {}\n", bar, line));
                }
            }
            out.push_str(&format!(" {}    {}\n", bar, block.term));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::Const;
    use crate::ir::function::{Function, Inst};

    #[test]
    fn renders_highlighted_listing() {
        let mut f = Function::new("f", None, vec![]);
        let a = f.next_inst(f.entry, Inst::LoadConst(Const::int(1)));
        let b = f.next_inst(f.entry, Inst::LoadConst(Const::int(2)));
        f.next_inst(f.entry, Inst::Add(a, b));
        f.remove_inst(b);
        let err = f.verify().unwrap_err();
        let rendered = Diagnostic::from_ir_error(&err).render(&f);
        assert!(rendered.contains("error"));
        assert!(rendered.contains("block_0"));
        assert!(rendered.contains("^"));
    }
}
