// Symbol extraction from Python syntax trees

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser as TreeParser, Tree};

use crate::error::{IndexError, Result};

/// A declaration found in one file, before it is tied to a package and path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSymbol {
    pub name: String,
    pub scope: String,
    pub row: u32,
    pub col: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorOptions {
    /// Walk into method bodies to find `self.attr = ...` declarations
    pub method_attributes: bool,
    /// First-parameter names that mark a function as a method
    pub self_names: Vec<String>,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            method_attributes: true,
            self_names: vec!["self".to_string(), "cls".to_string()],
        }
    }
}

/// Statement-level node kinds the walker distinguishes
enum Syntax<'t> {
    ClassDef {
        node: Node<'t>,
        name: Option<Node<'t>>,
        body: Option<Node<'t>>,
    },
    FunctionDef {
        node: Node<'t>,
        name: Option<Node<'t>>,
        body: Option<Node<'t>>,
        first_param: Option<Node<'t>>,
    },
    Assignment {
        left: Option<Node<'t>>,
        right: Option<Node<'t>>,
    },
    /// Module, block or compound statement: only its children matter
    Container(Node<'t>),
    /// Expressions, error regions and anything else that cannot declare
    Opaque,
}

impl<'t> Syntax<'t> {
    fn classify(node: Node<'t>) -> Self {
        match node.kind() {
            "class_definition" => Syntax::ClassDef {
                node,
                name: node.child_by_field_name("name"),
                body: node.child_by_field_name("body"),
            },
            "function_definition" => Syntax::FunctionDef {
                node,
                name: node.child_by_field_name("name"),
                body: node.child_by_field_name("body"),
                first_param: node
                    .child_by_field_name("parameters")
                    .and_then(first_parameter),
            },
            "assignment" => Syntax::Assignment {
                left: node.child_by_field_name("left"),
                right: node.child_by_field_name("right"),
            },
            "module" | "block" | "decorated_definition" => Syntax::Container(node),
            kind if kind.ends_with("_statement") || kind.ends_with("_clause") => {
                Syntax::Container(node)
            }
            _ => Syntax::Opaque,
        }
    }
}

/// Assignment target shapes
enum Target<'t> {
    Sequence(Node<'t>),
    Attribute {
        node: Node<'t>,
        object: Option<Node<'t>>,
        attribute: Option<Node<'t>>,
    },
    Name(Node<'t>),
    Other,
}

impl<'t> Target<'t> {
    fn classify(node: Node<'t>) -> Self {
        match node.kind() {
            "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern"
            | "tuple" | "list" => Target::Sequence(node),
            "attribute" => Target::Attribute {
                node,
                object: node.child_by_field_name("object"),
                attribute: node.child_by_field_name("attribute"),
            },
            "identifier" => Target::Name(node),
            _ => Target::Other,
        }
    }
}

/// Identifier node of the first positional parameter
fn first_parameter(params: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = params.walk();
    let first = params
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;

    match first.kind() {
        "identifier" => Some(first),
        "default_parameter" | "typed_default_parameter" => first.child_by_field_name("name"),
        "typed_parameter" => {
            let mut inner = first.walk();
            let name = first
                .named_children(&mut inner)
                .find(|child| child.kind() == "identifier");
            name
        }
        _ => None,
    }
}

/// Parse Python source into a tree-sitter tree
pub fn parse(source: &str, path: &str) -> Result<Tree> {
    let mut parser = TreeParser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|_| IndexError::Parse {
            path: path.to_string(),
        })?;

    parser.parse(source, None).ok_or_else(|| IndexError::Parse {
        path: path.to_string(),
    })
}

/// Stateless extractor configured with the method-body policy
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    options: ExtractorOptions,
}

impl Extractor {
    pub fn new(options: ExtractorOptions) -> Self {
        Self { options }
    }

    /// Lazily walk `tree` and yield its declarations in source order
    pub fn symbols<'t>(&'t self, tree: &'t Tree, source: &'t str) -> Symbols<'t> {
        Symbols {
            source: source.as_bytes(),
            options: &self.options,
            stack: vec![Frame::Visit(tree.root_node())],
            scope: Vec::new(),
            receiver: None,
        }
    }
}

enum Frame<'t> {
    Visit(Node<'t>),
    Target(Node<'t>),
    PopScope,
    RestoreReceiver(Option<&'t str>),
}

/// Single-pass iterator over the declarations of one tree
pub struct Symbols<'t> {
    source: &'t [u8],
    options: &'t ExtractorOptions,
    stack: Vec<Frame<'t>>,
    scope: Vec<&'t str>,
    /// Receiver name while inside a method body, `None` at module/class level
    receiver: Option<&'t str>,
}

impl<'t> Symbols<'t> {
    fn text(&self, node: Node<'t>) -> Option<&'t str> {
        node.utf8_text(self.source).ok().filter(|text| !text.is_empty())
    }

    fn symbol(&self, name: Option<&str>, at: Node<'t>) -> Option<ExtractedSymbol> {
        let name = name?;
        let position = at.start_position();
        Some(ExtractedSymbol {
            name: name.to_string(),
            scope: self.scope.join("."),
            row: position.row as u32,
            col: position.column as u32,
        })
    }

    fn push_children(&mut self, node: Node<'t>, frame: fn(Node<'t>) -> Frame<'t>) {
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        self.stack.extend(children.into_iter().rev().map(frame));
    }

    fn is_receiver_name(&self, name: &str) -> bool {
        self.options.self_names.iter().any(|n| n == name)
    }

    fn visit(&mut self, node: Node<'t>) -> Option<ExtractedSymbol> {
        match Syntax::classify(node) {
            Syntax::ClassDef { node, name, body } => {
                // Classes declared inside methods are local
                if self.receiver.is_some() {
                    return None;
                }
                let name = name.and_then(|n| self.text(n))?;
                let symbol = self.symbol(Some(name), node);
                if let Some(body) = body {
                    self.stack.push(Frame::PopScope);
                    self.stack.push(Frame::Visit(body));
                    self.scope.push(name);
                }
                symbol
            }
            Syntax::FunctionDef {
                node,
                name,
                body,
                first_param,
            } => {
                let symbol = self.symbol(name.and_then(|n| self.text(n)), node);
                let receiver = first_param
                    .and_then(|p| self.text(p))
                    .filter(|p| self.is_receiver_name(p));
                if let (true, Some(receiver), Some(body)) =
                    (self.options.method_attributes, receiver, body)
                {
                    self.stack.push(Frame::RestoreReceiver(self.receiver));
                    self.stack.push(Frame::Visit(body));
                    self.receiver = Some(receiver);
                }
                symbol
            }
            Syntax::Assignment { left, right } => {
                // `a = b = 1` nests the second assignment on the right
                if let Some(right) = right.filter(|r| r.kind() == "assignment") {
                    self.stack.push(Frame::Visit(right));
                }
                if let Some(left) = left {
                    self.stack.push(Frame::Target(left));
                }
                None
            }
            Syntax::Container(node) => {
                self.push_children(node, Frame::Visit);
                None
            }
            Syntax::Opaque => None,
        }
    }

    fn target(&mut self, node: Node<'t>) -> Option<ExtractedSymbol> {
        match Target::classify(node) {
            Target::Sequence(node) => {
                self.push_children(node, Frame::Target);
                None
            }
            Target::Attribute {
                node,
                object,
                attribute,
            } => {
                let receiver = self.receiver?;
                let object = object.filter(|o| o.kind() == "identifier")?;
                if self.text(object)? != receiver {
                    return None;
                }
                self.symbol(attribute.and_then(|a| self.text(a)), node)
            }
            Target::Name(node) if self.receiver.is_none() => self.symbol(self.text(node), node),
            Target::Name(_) | Target::Other => None,
        }
    }
}

impl<'t> Iterator for Symbols<'t> {
    type Item = ExtractedSymbol;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            let found = match frame {
                Frame::Visit(node) => self.visit(node),
                Frame::Target(node) => self.target(node),
                Frame::PopScope => {
                    self.scope.pop();
                    None
                }
                Frame::RestoreReceiver(previous) => {
                    self.receiver = previous;
                    None
                }
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_with(options: ExtractorOptions, source: &str) -> Vec<(String, String, u32, u32)> {
        let tree = parse(source, "test.py").unwrap();
        let extractor = Extractor::new(options);
        extractor
            .symbols(&tree, source)
            .map(|s| (s.name, s.scope, s.row, s.col))
            .collect()
    }

    fn extract(source: &str) -> Vec<(String, String, u32, u32)> {
        extract_with(ExtractorOptions::default(), source)
    }

    fn names(source: &str) -> Vec<String> {
        extract(source).into_iter().map(|(name, ..)| name).collect()
    }

    fn sym(name: &str, scope: &str, row: u32, col: u32) -> (String, String, u32, u32) {
        (name.to_string(), scope.to_string(), row, col)
    }

    #[test]
    fn test_class_method_and_instance_attribute() {
        let source = "class C:\n    def f(self):\n        self.x = 1\n";
        assert_eq!(
            extract(source),
            vec![sym("C", "", 0, 0), sym("f", "C", 1, 4), sym("x", "C", 2, 8)]
        );
    }

    #[test]
    fn test_nested_scopes() {
        let source = "\
class Outer:
    class Inner:
        def m(self):
            pass
    def after(self):
        pass

def top():
    pass
";
        assert_eq!(
            extract(source),
            vec![
                sym("Outer", "", 0, 0),
                sym("Inner", "Outer", 1, 4),
                sym("m", "Outer.Inner", 2, 8),
                sym("after", "Outer", 4, 4),
                sym("top", "", 7, 0),
            ]
        );
    }

    #[test]
    fn test_scope_is_restored_after_class() {
        let source = "class A:\n    pass\nv = 1\n";
        assert_eq!(extract(source), vec![sym("A", "", 0, 0), sym("v", "", 2, 0)]);
    }

    #[test]
    fn test_destructuring_targets() {
        let source = "a, (b, [c, *d]) = 1, (2, [3, 4])\n";
        assert_eq!(names(source), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_chained_assignment() {
        assert_eq!(names("a = b = 1\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_class_level_assignments() {
        let source = "class Config:\n    debug = False\n    level: int = 3\n";
        assert_eq!(
            extract(source),
            vec![
                sym("Config", "", 0, 0),
                sym("debug", "Config", 1, 4),
                sym("level", "Config", 2, 4),
            ]
        );
    }

    #[test]
    fn test_function_locals_are_not_indexed() {
        let source = "def g():\n    y = 1\n    class Hidden:\n        pass\n";
        assert_eq!(names(source), vec!["g"]);
    }

    #[test]
    fn test_method_body_locals_and_foreign_attributes() {
        let source = "\
class K:
    def f(self, other):
        other.y = 1
        self.z = 2
        w = 3
        class Local:
            pass
";
        assert_eq!(names(source), vec!["K", "f", "z"]);
    }

    #[test]
    fn test_classmethod_receiver() {
        let source = "\
class K:
    @classmethod
    def make(cls):
        cls.registry = {}
";
        assert_eq!(
            extract(source),
            vec![
                sym("K", "", 0, 0),
                sym("make", "K", 2, 4),
                sym("registry", "K", 3, 8),
            ]
        );
    }

    #[test]
    fn test_typed_and_async_receiver() {
        let source = "class S:\n    async def run(self: 'S'):\n        self.state = 0\n";
        assert_eq!(
            extract(source),
            vec![sym("S", "", 0, 0), sym("run", "S", 1, 4), sym("state", "S", 2, 8)]
        );
    }

    #[test]
    fn test_nested_function_keeps_outer_receiver() {
        let source = "\
class K:
    def f(self):
        def helper(x):
            pass
        self.after = 1
";
        assert_eq!(names(source), vec!["K", "f", "helper", "after"]);
    }

    #[test]
    fn test_method_attributes_disabled() {
        let options = ExtractorOptions {
            method_attributes: false,
            ..ExtractorOptions::default()
        };
        let source = "class C:\n    def f(self):\n        self.x = 1\n";
        let found: Vec<_> = extract_with(options, source)
            .into_iter()
            .map(|(name, ..)| name)
            .collect();
        assert_eq!(found, vec!["C", "f"]);
    }

    #[test]
    fn test_custom_receiver_names() {
        let options = ExtractorOptions {
            method_attributes: true,
            self_names: vec!["this".to_string()],
        };
        let source = "class C:\n    def f(this):\n        this.x = 1\n    def g(self):\n        self.y = 1\n";
        let found: Vec<_> = extract_with(options, source)
            .into_iter()
            .map(|(name, ..)| name)
            .collect();
        assert_eq!(found, vec!["C", "f", "x", "g"]);
    }

    #[test]
    fn test_compound_statements_are_walked() {
        let source = "\
if True:
    A = 1
else:
    B = 2
try:
    C = 3
except Exception:
    D = 4
for i in range(3):
    E = i
";
        assert_eq!(names(source), vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_expressions_are_not_descended() {
        let source = "x = [y for y in range(3)]\nprint(lambda: 0)\nz += 1\n";
        assert_eq!(names(source), vec!["x"]);
    }

    #[test]
    fn test_error_regions_are_skipped() {
        let source = "def ok():\n    pass\n\n)\n";
        let tree = parse(source, "broken.py").unwrap();
        assert!(tree.root_node().has_error());

        let extractor = Extractor::default();
        let found: Vec<_> = extractor.symbols(&tree, source).map(|s| s.name).collect();
        assert!(found.contains(&"ok".to_string()));
    }

    #[test]
    fn test_options_from_toml() {
        let options: ExtractorOptions = toml::from_str("method_attributes = false").unwrap();
        assert!(!options.method_attributes);
        assert_eq!(options.self_names, vec!["self", "cls"]);
    }
}
