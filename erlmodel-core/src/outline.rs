//! Outline extraction: top-level forms of a module's text
//!
//! Only the outline is recovered (attributes, records, macros, functions and
//! their clause heads). Expressions inside bodies are never interpreted.

use crate::element::{ElementInfo, ElementKind, ElementSpec};
use crate::handle::Handle;
use std::collections::{HashMap, HashSet};

/// Turns module text into the module's element subtrees
pub trait OutlineParser: Send + Sync {
    fn parse(&self, module: &Handle, source: &str) -> Vec<ElementSpec>;
}

/// Line-oriented scanner over forms starting in column 0.
///
/// A form starts on a line whose first character is `-` (attribute) or an
/// atom (function clause) and runs until the next such line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineOutlineParser;

impl OutlineParser for LineOutlineParser {
    fn parse(&self, module: &Handle, source: &str) -> Vec<ElementSpec> {
        let forms: Vec<Form> = chunks(source).iter().filter_map(classify).collect();
        build_outline(module, forms)
    }
}

/// Source text of one top-level form, comments stripped
struct Chunk {
    line: usize,
    text: String,
}

#[derive(Debug, PartialEq)]
enum Form {
    Attribute {
        name: String,
        value: Option<String>,
        line: usize,
    },
    Record {
        name: String,
        line: usize,
    },
    Macro {
        name: String,
        line: usize,
    },
    Clause {
        name: String,
        arity: u32,
        head: String,
        line: usize,
    },
}

fn chunks(source: &str) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let code = strip_comment(line);
        let starts_form = matches!(
            code.chars().next(),
            Some(c) if c == '-' || c == '\'' || c.is_ascii_lowercase()
        );
        if starts_form {
            chunks.push(Chunk {
                line: index + 1,
                text: code.to_string(),
            });
        } else if let Some(current) = chunks.last_mut() {
            current.text.push('\n');
            current.text.push_str(code);
        }
    }
    chunks
}

fn classify(chunk: &Chunk) -> Option<Form> {
    let text = chunk.text.trim_end();
    let line = chunk.line;

    if let Some(rest) = text.strip_prefix('-') {
        let (name, after) = parse_atom(rest.trim_start())?;
        let inner = parenthesized(after.trim_start());

        return Some(match name.as_str() {
            "record" => Form::Record {
                name: parse_atom(inner?.trim_start())?.0,
                line,
            },
            "define" => Form::Macro {
                name: parse_macro_name(inner?.trim_start())?,
                line,
            },
            _ => {
                // `-spec f(T) -> T.` style attributes carry no parentheses
                let value = match inner {
                    Some(inner) => Some(collapse(inner)),
                    None => Some(collapse(after.trim_end_matches('.'))).filter(|v| !v.is_empty()),
                };
                Form::Attribute { name, value, line }
            }
        });
    }

    let (name, after) = parse_atom(text)?;
    let args = parenthesized(after.trim_start())?;
    let head = match find_arrow(text) {
        Some(arrow) => collapse(&text[..arrow]),
        None => collapse(text.trim_end_matches('.')),
    };
    Some(Form::Clause {
        name,
        arity: count_args(args),
        head,
        line,
    })
}

struct FunctionOutline {
    name: String,
    arity: u32,
    line: usize,
    clauses: Vec<(String, usize)>,
}

enum Item {
    Leaf(ElementSpec),
    Function(usize),
}

fn build_outline(module: &Handle, forms: Vec<Form>) -> Vec<ElementSpec> {
    let mut items: Vec<Item> = Vec::new();
    let mut functions: Vec<FunctionOutline> = Vec::new();
    let mut attribute_counts: HashMap<String, usize> = HashMap::new();
    let mut definitions: HashSet<(ElementKind, String)> = HashSet::new();
    let mut exports: HashSet<(String, u32)> = HashSet::new();
    let mut export_all = false;

    for form in forms {
        match form {
            Form::Attribute { name, value, line } => {
                match (name.as_str(), value.as_deref()) {
                    ("export", Some(list)) => exports.extend(parse_export_list(list)),
                    ("compile", Some(options)) => {
                        export_all |= options
                            .split(|c: char| !c.is_alphanumeric() && c != '_')
                            .any(|word| word == "export_all");
                    }
                    _ => {}
                }

                let count = attribute_counts.entry(name.clone()).or_insert(0);
                *count += 1;
                let local = if *count == 1 {
                    name
                } else {
                    format!("{}[{}]", name, count)
                };
                items.push(Item::Leaf(ElementSpec::leaf(
                    module.child(local, ElementKind::Attribute),
                    ElementInfo::Attribute { value, line },
                )));
            }
            Form::Record { name, line } => {
                if definitions.insert((ElementKind::RecordDef, name.clone())) {
                    items.push(Item::Leaf(ElementSpec::leaf(
                        module.child(name, ElementKind::RecordDef),
                        ElementInfo::RecordDef { line },
                    )));
                }
            }
            Form::Macro { name, line } => {
                if definitions.insert((ElementKind::MacroDef, name.clone())) {
                    items.push(Item::Leaf(ElementSpec::leaf(
                        module.child(name, ElementKind::MacroDef),
                        ElementInfo::MacroDef { line },
                    )));
                }
            }
            Form::Clause {
                name,
                arity,
                head,
                line,
            } => {
                let existing = functions
                    .iter()
                    .position(|f| f.name == name && f.arity == arity);
                match existing {
                    Some(index) => functions[index].clauses.push((head, line)),
                    None => {
                        functions.push(FunctionOutline {
                            name,
                            arity,
                            line,
                            clauses: vec![(head, line)],
                        });
                        items.push(Item::Function(functions.len() - 1));
                    }
                }
            }
        }
    }

    items
        .into_iter()
        .map(|item| match item {
            Item::Leaf(spec) => spec,
            Item::Function(index) => {
                let function = &functions[index];
                let handle = module.function(function.name.clone(), function.arity);
                let exported =
                    export_all || exports.contains(&(function.name.clone(), function.arity));
                let clauses = function
                    .clauses
                    .iter()
                    .enumerate()
                    .map(|(i, (head, line))| {
                        ElementSpec::leaf(
                            handle.child((i + 1).to_string(), ElementKind::Clause),
                            ElementInfo::Clause {
                                head: head.clone(),
                                line: *line,
                            },
                        )
                    })
                    .collect();
                ElementSpec::leaf(
                    handle,
                    ElementInfo::Function {
                        exported,
                        line: function.line,
                    },
                )
                .with_children(clauses)
            }
        })
        .collect()
}

/// `[f/1, 'g'/2]` → {(f,1), (g,2)}
fn parse_export_list(value: &str) -> Vec<(String, u32)> {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .filter_map(|entry| {
            let (name, arity) = entry.trim().rsplit_once('/')?;
            let (name, _) = parse_atom(name.trim())?;
            Some((name, arity.trim().parse().ok()?))
        })
        .collect()
}

/// Drop a trailing `%` comment, ignoring `%` inside strings, quoted atoms
/// and character literals
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(_), '\\') => {
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '$') => {
                if let Some((_, '\\')) = chars.next() {
                    chars.next();
                }
            }
            (None, '%') => return &line[..i],
            (None, _) => {}
        }
    }
    line
}

/// Characters outside literals with their bracket depth
fn code_chars(text: &str) -> Vec<(usize, char, usize)> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' | '\'' => {
                while let Some((_, next)) = chars.next() {
                    if next == '\\' {
                        chars.next();
                    } else if next == c {
                        break;
                    }
                }
            }
            '$' => {
                if let Some((_, '\\')) = chars.next() {
                    chars.next();
                }
            }
            '(' | '[' | '{' => {
                out.push((i, c, depth));
                depth += 1;
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                out.push((i, c, depth));
            }
            '<' if matches!(chars.peek(), Some((_, '<'))) => {
                chars.next();
                out.push((i, c, depth));
                depth += 1;
            }
            '>' if matches!(chars.peek(), Some((_, '>'))) => {
                chars.next();
                depth = depth.saturating_sub(1);
                out.push((i, c, depth));
            }
            _ => out.push((i, c, depth)),
        }
    }
    out
}

/// Contents of the parenthesized group `text` starts with; an unterminated
/// group runs to the end of the text
fn parenthesized(text: &str) -> Option<&str> {
    if !text.starts_with('(') {
        return None;
    }
    let close = code_chars(text)
        .into_iter()
        .skip(1)
        .find(|&(_, c, depth)| c == ')' && depth == 0)
        .map_or(text.len(), |(i, _, _)| i);
    Some(&text[1..close])
}

fn count_args(args: &str) -> u32 {
    if args.trim().is_empty() {
        return 0;
    }
    let commas = code_chars(args)
        .into_iter()
        .filter(|&(_, c, depth)| c == ',' && depth == 0)
        .count();
    u32::try_from(commas + 1).unwrap_or(u32::MAX)
}

/// Byte offset of the first top-level `->`
fn find_arrow(text: &str) -> Option<usize> {
    code_chars(text)
        .windows(2)
        .find(|w| w[0].1 == '-' && w[1].1 == '>' && w[0].2 == 0 && w[1].0 == w[0].0 + 1)
        .map(|w| w[0].0)
}

fn parse_atom(text: &str) -> Option<(String, &str)> {
    let first = text.chars().next()?;
    if first == '\'' {
        let mut name = String::new();
        let mut escaped = false;
        for (i, c) in text.char_indices().skip(1) {
            if escaped {
                name.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '\'' {
                return Some((name, &text[i + 1..]));
            } else {
                name.push(c);
            }
        }
        None
    } else if first.is_ascii_lowercase() {
        let end = name_end(text);
        Some((text[..end].to_string(), &text[end..]))
    } else {
        None
    }
}

/// Macro names may also be variable-like (`SERVER`)
fn parse_macro_name(text: &str) -> Option<String> {
    if text.starts_with('\'') {
        return parse_atom(text).map(|(name, _)| name);
    }
    let end = name_end(text);
    (end > 0).then(|| text[..end].to_string())
}

fn name_end(text: &str) -> usize {
    text.char_indices()
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_' || c == '@'))
        .map_or(text.len(), |(i, _)| i)
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"%% A server
-module(server).
-export([start/0, handle_call/3]).
-define(TIMEOUT, 5000).
-record(state, {count = 0, name = "x%y"}).

start() ->
    ok.

handle_call({get, Key}, _From, #state{} = S) when is_atom(Key) ->
    {reply, Key, S};
handle_call(stop, _From, S) ->
    {stop, normal, S}.

%% helper
loop(X) -> X.
loop(X, Y) -> {X, Y}.
-spec loop(term()) -> term().
-spec loop(term(), term()) -> term().
"#;

    fn outline() -> Vec<ElementSpec> {
        let module = Handle::project("app").child("server", ElementKind::Module);
        LineOutlineParser.parse(&module, SOURCE)
    }

    fn labels(specs: &[ElementSpec]) -> Vec<String> {
        specs.iter().map(|s| s.handle.label()).collect()
    }

    #[test]
    fn test_outline_in_source_order() {
        assert_eq!(
            labels(&outline()),
            vec![
                "attributemodule",
                "attributeexport",
                "macro_defTIMEOUT",
                "record_defstate",
                "functionstart/0",
                "functionhandle_call/3",
                "functionloop/1",
                "functionloop/2",
                "attributespec",
                "attributespec[2]",
            ]
        );
    }

    #[test]
    fn test_clauses_grouped_with_heads() {
        let specs = outline();
        let handle_call = &specs[5];
        assert_eq!(
            handle_call.info,
            ElementInfo::Function {
                exported: true,
                line: 10
            }
        );
        assert_eq!(handle_call.children.len(), 2);
        assert_eq!(handle_call.children[0].handle.name(), "1");
        assert_eq!(
            handle_call.children[0].info,
            ElementInfo::Clause {
                head: "handle_call({get, Key}, _From, #state{} = S) when is_atom(Key)".to_string(),
                line: 10
            }
        );
        assert_eq!(
            handle_call.children[1].info,
            ElementInfo::Clause {
                head: "handle_call(stop, _From, S)".to_string(),
                line: 12
            }
        );
    }

    #[test]
    fn test_export_flags() {
        let specs = outline();
        let exported: Vec<_> = specs
            .iter()
            .filter_map(|s| match s.info {
                ElementInfo::Function { exported, .. } => Some((s.handle.label(), exported)),
                _ => None,
            })
            .collect();
        assert_eq!(
            exported,
            vec![
                ("functionstart/0".to_string(), true),
                ("functionhandle_call/3".to_string(), true),
                ("functionloop/1".to_string(), false),
                ("functionloop/2".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_export_all() {
        let module = Handle::project("app").child("m", ElementKind::Module);
        let specs = LineOutlineParser.parse(&module, "-compile([export_all]).\nf() -> ok.\n");
        assert_eq!(
            specs[1].info,
            ElementInfo::Function {
                exported: true,
                line: 2
            }
        );
    }

    #[test]
    fn test_attribute_values() {
        let specs = outline();
        assert_eq!(
            specs[0].info,
            ElementInfo::Attribute {
                value: Some("server".to_string()),
                line: 2
            }
        );
    }

    #[test]
    fn test_unparenthesized_attribute_value() {
        let specs = outline();
        assert_eq!(
            specs[8].info,
            ElementInfo::Attribute {
                value: Some("loop(term()) -> term()".to_string()),
                line: 18
            }
        );
    }

    #[test]
    fn test_arity_counting() {
        assert_eq!(count_args(""), 0);
        assert_eq!(count_args("  "), 0);
        assert_eq!(count_args("A"), 1);
        assert_eq!(count_args("{a, b}, [c, d], <<E:8, F/binary>>"), 3);
        assert_eq!(count_args("\"a,b\", $,, 'x,y'"), 3);
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("f() -> ok. % done"), "f() -> ok. ");
        assert_eq!(strip_comment("X = \"50%\","), "X = \"50%\",");
        assert_eq!(strip_comment("C = $%,"), "C = $%,");
    }

    #[test]
    fn test_quoted_function_name() {
        let module = Handle::project("app").child("m", ElementKind::Module);
        let specs = LineOutlineParser.parse(&module, "'weird name'(X) -> X.\n");
        assert_eq!(specs[0].handle.name(), "weird name");
        assert_eq!(specs[0].handle.arity(), Some(1));
    }

    #[test]
    fn test_non_consecutive_clauses_merge() {
        let module = Handle::project("app").child("m", ElementKind::Module);
        let source = "f(1) -> a;\ng() -> b.\nf(2) -> c.\n";
        let specs = LineOutlineParser.parse(&module, source);
        assert_eq!(labels(&specs), vec!["functionf/1", "functiong/0"]);
        assert_eq!(specs[0].children.len(), 2);
    }
}
