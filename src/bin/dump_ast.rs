//! Print the tree-sitter syntax tree of a Java file, or the lowered AST with `--ast`

use apicheck::parser::{descendants, node_text, JavaParser, Parser as _};
use miette::{miette, IntoDiagnostic, Result};
use std::path::PathBuf;
use tree_sitter::Parser;

fn main() -> Result<()> {
    let args = std::env::args().skip(1);
    let mut lowered = false;
    let mut path = None;
    for arg in args {
        match arg.as_str() {
            "--ast" => lowered = true,
            _ => path = Some(PathBuf::from(arg)),
        }
    }
    let path = path.ok_or_else(|| miette!("usage: dump_ast [--ast] <File.java>"))?;
    let source = std::fs::read_to_string(&path).into_diagnostic()?;

    if lowered {
        let unit = JavaParser::new().parse(&path, &source)?;
        println!("{:#?}", unit);
        return Ok(());
    }

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::language())
        .into_diagnostic()?;
    let tree = parser
        .parse(&source, None)
        .ok_or_else(|| miette!("tree-sitter returned no tree for {}", path.display()))?;

    print_tree(&tree.root_node(), &source, 0);

    let errors = descendants(tree.root_node())
        .filter(|n| n.is_error() || n.is_missing())
        .count();
    if errors > 0 {
        eprintln!("{} syntax errors", errors);
    }
    Ok(())
}

fn print_tree(node: &tree_sitter::Node, source: &str, indent: usize) {
    let text = if node.child_count() == 0 {
        format!(" \"{}\"", node_text(*node, source))
    } else {
        String::new()
    };
    println!(
        "{}{} [{}:{}]{}",
        "  ".repeat(indent),
        node.kind(),
        node.start_position().row + 1,
        node.start_position().column + 1,
        text
    );

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        print_tree(&child, source, indent + 1);
    }
}
