use crate::ir::function::Function;

pub mod diagnostics;
pub mod formatting;

/// Renders a function's control-flow graph as graphviz dot text.
pub fn cfg_dot(function: &Function) -> String {
    use std::fmt::Write;

    let mut dot = String::new();
    writeln!(dot, "digraph \"{}\" {{", function.name).unwrap();
    writeln!(dot, "  node [shape=box, fontname=monospace];").unwrap();
    for (block_ref, block) in function.iter_blocks() {
        let mut label = format!("{}\\l", block_ref);
        for inst_ref in &block.insts {
            label.push_str(&format!(
                "{} = {}\\l",
                inst_ref,
                function.inst(*inst_ref)
            ));
        }
        label.push_str(&format!("{}\\l", block.term));
        writeln!(
            dot,
            "  {} [label=\"{}\"];",
            block_ref.0,
            label.replace('"', "\\\"")
        )
        .unwrap();
        let mut term = block.term.clone();
        term.for_each_block_ref(|succ| {
            writeln!(dot, "  {} -> {};", block_ref.0, succ.0).unwrap();
        });
    }
    writeln!(dot, "}}").unwrap();
    dot
}

/// Opens and shows a graphviz dot file in the default viewer.
pub fn show_graphviz(dot: &str) {
    use std::io::Write;
    use std::process::{Command, Stdio};
    use tempfile::Builder;

    let process = Command::new("dot")
        .arg("-Tsvg")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("can't spawn dot");
    process
        .stdin
        .as_ref()
        .unwrap()
        .write_all(dot.as_bytes())
        .unwrap();
    let output = process.wait_with_output().expect("can't read dot output");
    let mut tempfile = Builder::new()
        .prefix("cellvm-opt")
        .suffix(".svg")
        .tempfile()
        .expect("can't create temp file");
    tempfile
        .write_all(&output.stdout)
        .expect("can't write to temp file");
    tempfile.flush().expect("can't flush temp file");
    let (_, path) = tempfile.keep().expect("can't keep temp file");
    opener::open(path).expect("can't open temp file");
}
