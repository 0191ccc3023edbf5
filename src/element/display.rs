//! Finite, JSON-like rendering of element graphs.
//!
//! Composites are numbered in the order they are first reached; reaching one
//! again prints a back-reference marker (`@node#0`) instead of its contents.
use std::collections::HashMap;
use std::fmt;

use super::{Element, List, Node};

enum Task {
    Visit(Element),
    Text(&'static str),
    Key(String),
}

/// Render into `out` without recursion.
pub fn render(root: &Element, out: &mut impl fmt::Write) -> fmt::Result {
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut tasks = vec![Task::Visit(root.clone())];

    while let Some(task) = tasks.pop() {
        let element = match task {
            Task::Text(s) => {
                out.write_str(s)?;
                continue;
            }
            Task::Key(k) => {
                write!(out, "{k:?}: ")?;
                continue;
            }
            Task::Visit(element) => element,
        };
        if let Some(id) = element.identity() {
            let next = seen.len();
            if let Some(ordinal) = seen.get(&id) {
                let tag = if element.as_node().is_some() { "node" } else { "list" };
                write!(out, "@{tag}#{ordinal}")?;
                continue;
            }
            seen.insert(id, next);
        }
        match element {
            Element::Null => out.write_str("null")?,
            Element::Boolean(b) => write!(out, "{b}")?,
            Element::Number(n) => write!(out, "{n}")?,
            Element::String(s) => write!(out, "{s:?}")?,
            Element::List(list) => {
                out.write_str("[")?;
                tasks.push(Task::Text("]"));
                let items = list.items();
                for (i, item) in items.into_iter().enumerate().rev() {
                    tasks.push(Task::Visit(item));
                    if i > 0 {
                        tasks.push(Task::Text(", "));
                    }
                }
            }
            Element::Node(node) => {
                out.write_str("{")?;
                tasks.push(Task::Text("}"));
                let entries = node.entries();
                for (i, (key, value)) in entries.into_iter().enumerate().rev() {
                    tasks.push(Task::Visit(value));
                    tasks.push(Task::Key(key));
                    if i > 0 {
                        tasks.push(Task::Text(", "));
                    }
                }
            }
        }
    }
    Ok(())
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, f)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, f)
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(&Element::List(self.clone()), f)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(&Element::Node(self.clone()), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_values_in_order() {
        let node = Node::new();
        node.insert("x", 1);
        node.insert("y", Element::from(vec![1.5, 2.0]));
        node.insert("z", Element::Null);
        assert_eq!(Element::Node(node).to_string(), r#"{"x": 1, "y": [1.5, 2.0], "z": null}"#);
    }

    #[test]
    fn second_visit_prints_back_reference() {
        let node = Node::new();
        node.insert("self", node.clone());
        let shared = List::from_vec(vec![Element::from("a")]);
        node.insert("p", shared.clone());
        node.insert("q", shared);
        assert_eq!(
            Element::Node(node.clone()).to_string(),
            r#"{"self": @node#0, "p": ["a"], "q": @list#1}"#
        );
        node.clear();
    }
}
