//! Token scanner and declaration heuristics for C#-like source

use std::sync::LazyLock;

use regex::Regex;

use crate::engine::SymbolKind;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)//[^\n]*|/\*.*?\*/|@?"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'|[0-9][0-9A-Za-z_.]*|[A-Za-z_][A-Za-z0-9_]*|=>|[^\sA-Za-z0-9_]"#,
    )
    .unwrap()
});

static XML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "base", "break", "case", "catch", "checked", "class",
    "const", "continue", "default", "delegate", "do", "else", "enum", "event", "explicit",
    "extern", "false", "finally", "fixed", "for", "foreach", "get", "goto", "if", "implicit",
    "in", "interface", "internal", "is", "lock", "namespace", "new", "null", "operator", "out",
    "override", "params", "partial", "private", "protected", "public", "readonly", "record",
    "ref", "return", "sealed", "set", "sizeof", "stackalloc", "static", "struct", "switch",
    "this", "throw", "true", "try", "typeof", "unchecked", "unsafe", "using", "virtual",
    "volatile", "when", "where", "while", "yield",
];

/// Built-in type names; they may precede a declared name.
const PREDEFINED_TYPES: &[&str] = &[
    "bool", "byte", "char", "decimal", "double", "dynamic", "float", "int", "long", "object",
    "sbyte", "short", "string", "uint", "ulong", "ushort", "var", "void",
];

const MODIFIERS: &[&str] = &[
    "abstract", "internal", "new", "partial", "private", "protected", "public", "readonly",
    "sealed", "static", "unsafe", "virtual", "override", "async", "extern",
];

pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text) || PREDEFINED_TYPES.contains(&text)
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_keyword(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Punct,
    Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl Token<'_> {
    fn is(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }

    fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    /// An identifier that can name a user symbol.
    pub fn is_name(&self) -> bool {
        self.is_ident() && !is_keyword(self.text)
    }
}

/// Splits source text into tokens. Comments are dropped; string, char and
/// numeric literals become opaque tokens.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    TOKEN
        .find_iter(text)
        .filter_map(|m| {
            let s = m.as_str();
            let kind = if s.starts_with("//") || s.starts_with("/*") {
                return None;
            } else if s.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
                TokenKind::Ident
            } else if s.starts_with(|c: char| c.is_ascii_digit() || c == '"' || c == '\'' || c == '@')
            {
                TokenKind::Literal
            } else {
                TokenKind::Punct
            };
            Some(Token {
                kind,
                text: s,
                start: m.start(),
                end: m.end(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub kind: SymbolKind,
    pub name_start: usize,
    pub name_end: usize,
    pub start: usize,
    pub end: usize,
    pub namespace: Option<String>,
    /// Enclosing type names, outermost first.
    pub containers: Vec<String>,
    pub parent: Option<usize>,
    pub signature: String,
    pub documentation: String,
    pub is_partial: bool,
}

impl Declaration {
    pub fn qualified_name(&self) -> String {
        if self.kind == SymbolKind::Local {
            return self.name.clone();
        }
        let mut parts: Vec<&str> = Vec::new();
        if let Some(namespace) = &self.namespace {
            parts.push(namespace);
        }
        parts.extend(self.containers.iter().map(String::as_str));
        parts.push(&self.name);
        parts.join(".")
    }

    /// Fully qualified name of the outermost enclosing type.
    pub fn top_level_type(&self) -> Option<String> {
        let outermost = match self.containers.first() {
            Some(container) => container,
            None if self.kind.is_type() => &self.name,
            None => return None,
        };
        Some(match &self.namespace {
            Some(namespace) => format!("{}.{}", namespace, outermost),
            None => outermost.clone(),
        })
    }

    /// Containing top-level type, excluding the declaration itself.
    pub fn containing_type(&self) -> Option<String> {
        if self.containers.is_empty() {
            return None;
        }
        self.top_level_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsingDirective {
    pub namespace: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug)]
pub struct Scan<'a> {
    pub tokens: Vec<Token<'a>>,
    pub declarations: Vec<Declaration>,
    pub usings: Vec<UsingDirective>,
}

impl<'a> Scan<'a> {
    /// The identifier touching `offset`, preferring one that contains it.
    pub fn name_at(&self, offset: usize) -> Option<&Token<'a>> {
        let containing = self
            .tokens
            .iter()
            .find(|t| t.start <= offset && offset < t.end);
        match containing {
            Some(token) if token.is_name() => Some(token),
            Some(_) => None,
            None => self.tokens.iter().find(|t| t.end == offset && t.is_name()),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &Token<'a>> {
        self.tokens.iter().filter(|t| t.is_name())
    }

    pub fn declaration_at(&self, name_start: usize) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name_start == name_start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScopeKind {
    Namespace(String),
    Type { name: String, kind: SymbolKind },
    Member,
    Block,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    declaration: Option<usize>,
}

struct Scanner<'a> {
    text: &'a str,
    tokens: Vec<Token<'a>>,
    declarations: Vec<Declaration>,
    usings: Vec<UsingDirective>,
    scopes: Vec<Scope>,
    pending: Option<(ScopeKind, Option<usize>)>,
    file_namespace: Option<String>,
    paren_depth: usize,
}

pub fn scan(text: &str) -> Scan<'_> {
    let mut scanner = Scanner {
        text,
        tokens: tokenize(text),
        declarations: Vec::new(),
        usings: Vec::new(),
        scopes: Vec::new(),
        pending: None,
        file_namespace: None,
        paren_depth: 0,
    };
    scanner.run();
    Scan {
        tokens: scanner.tokens,
        declarations: scanner.declarations,
        usings: scanner.usings,
    }
}

impl<'a> Scanner<'a> {
    fn run(&mut self) {
        let mut i = 0;
        while i < self.tokens.len() {
            i = self.step(i);
        }
        let len = self.text.len();
        for decl in &mut self.declarations {
            if decl.end == usize::MAX {
                decl.end = len;
            }
        }
    }

    /// Handles token `i` and returns the index of the next token to visit.
    fn step(&mut self, i: usize) -> usize {
        let token = self.tokens[i];
        match token.kind {
            TokenKind::Punct => self.punct(token),
            TokenKind::Ident => match token.text {
                "namespace" => return self.namespace(i),
                "using" => return self.using(i),
                "class" | "struct" | "interface" | "enum" | "record" => self.type_declaration(i),
                _ if token.is_name() => self.member_declaration(i),
                _ => {}
            },
            TokenKind::Literal => {}
        }
        i + 1
    }

    fn punct(&mut self, token: Token<'a>) {
        match token.text {
            "{" => {
                let (kind, declaration) = self.pending.take().unwrap_or((ScopeKind::Block, None));
                self.scopes.push(Scope { kind, declaration });
            }
            "}" => {
                if let Some(scope) = self.scopes.pop()
                    && let Some(idx) = scope.declaration
                {
                    self.declarations[idx].end = token.end;
                }
            }
            ";" => {
                if let Some((_, Some(idx))) = self.pending.take() {
                    self.declarations[idx].end = token.end;
                }
            }
            "(" => self.paren_depth += 1,
            ")" => self.paren_depth = self.paren_depth.saturating_sub(1),
            _ => {}
        }
    }

    fn namespace(&mut self, i: usize) -> usize {
        let (name, next) = self.dotted_name(i + 1);
        if name.is_empty() {
            return i + 1;
        }
        let name_token = self.tokens[i + 1];
        let name_end = self.tokens[next - 1].end;
        let outer = self.current_namespace();
        let full = match &outer {
            Some(outer) => format!("{}.{}", outer, name),
            None => name.clone(),
        };

        let idx = self.declarations.len();
        self.declarations.push(Declaration {
            name: name.clone(),
            kind: SymbolKind::Namespace,
            name_start: name_token.start,
            name_end,
            start: self.tokens[i].start,
            end: usize::MAX,
            namespace: outer,
            containers: Vec::new(),
            parent: self.parent(),
            signature: format!("namespace {}", full),
            documentation: String::new(),
            is_partial: false,
        });

        if self.tokens.get(next).is_some_and(|t| t.is(";")) {
            self.file_namespace = Some(full);
            return next + 1;
        }
        self.pending = Some((ScopeKind::Namespace(full), Some(idx)));
        next
    }

    fn using(&mut self, i: usize) -> usize {
        // Only plain `using A.B;` directives outside types and members.
        let at_top_level = self
            .scopes
            .iter()
            .all(|s| matches!(s.kind, ScopeKind::Namespace(_)));
        let (name, next) = self.dotted_name(i + 1);
        if at_top_level
            && !name.is_empty()
            && !is_keyword(self.tokens[i + 1].text)
            && let Some(semicolon) = self.tokens.get(next).filter(|t| t.is(";"))
        {
            self.usings.push(UsingDirective {
                namespace: name,
                start: self.tokens[i].start,
                end: semicolon.end,
            });
            return next + 1;
        }
        i + 1
    }

    fn type_declaration(&mut self, i: usize) {
        let Some(name_token) = self.tokens.get(i + 1).copied() else {
            return;
        };
        if !name_token.is_name() {
            return;
        }
        let keyword = self.tokens[i].text;
        let Some(kind) = SymbolKind::from_keyword(keyword) else {
            return;
        };

        let start = self.modifiers_start(i);
        let is_partial = self.tokens[self.token_index(start)..i]
            .iter()
            .any(|t| t.text == "partial");
        let namespace = self.current_namespace();
        let containers = self.containers();
        let qualified = qualify(namespace.as_deref(), &containers, name_token.text);

        let idx = self.declarations.len();
        self.declarations.push(Declaration {
            name: name_token.text.to_string(),
            kind,
            name_start: name_token.start,
            name_end: name_token.end,
            start,
            end: usize::MAX,
            namespace,
            containers,
            parent: self.parent(),
            signature: format!("{} {}", keyword, qualified),
            documentation: self.documentation(start),
            is_partial,
        });
        self.pending = Some((
            ScopeKind::Type {
                name: name_token.text.to_string(),
                kind,
            },
            Some(idx),
        ));
    }

    fn member_declaration(&mut self, i: usize) {
        if let Some(kind) = self.enum_member(i) {
            self.push_member(i, kind, None, None);
            return;
        }

        let Some(type_start) = i.checked_sub(1).and_then(|prev| self.type_start(prev)) else {
            return;
        };
        let Some(next) = self.tokens.get(i + 1).copied() else {
            return;
        };

        let in_type = self.innermost_is_type() && self.paren_depth == 0;
        let kind = if next.is("(") {
            SymbolKind::Method
        } else if in_type && (next.is("{") || next.is("=>")) {
            SymbolKind::Property
        } else if next.is(";")
            || next.is("=")
            || next.is(",")
            || next.is(")")
            || (next.is_ident() && next.text == "in")
        {
            if in_type {
                SymbolKind::Field
            } else {
                SymbolKind::Local
            }
        } else {
            return;
        };

        let type_text = self.text[self.tokens[type_start].start..self.tokens[i - 1].end].to_string();
        let params = (kind == SymbolKind::Method)
            .then(|| self.parameter_text(i + 1))
            .flatten();
        let idx = self.push_member(i, kind, Some(type_start), Some((type_text, params)));

        match kind {
            SymbolKind::Method | SymbolKind::Property => {
                self.pending = Some((ScopeKind::Member, Some(idx)));
            }
            _ => {}
        }
    }

    fn push_member(
        &mut self,
        i: usize,
        kind: SymbolKind,
        type_start: Option<usize>,
        type_and_params: Option<(String, Option<String>)>,
    ) -> usize {
        let token = self.tokens[i];
        let namespace = self.current_namespace();
        let containers = self.containers();
        let qualified = if kind == SymbolKind::Local {
            token.text.to_string()
        } else {
            qualify(namespace.as_deref(), &containers, token.text)
        };
        let signature = match type_and_params {
            Some((type_text, Some(params))) => format!("{} {}({})", type_text, qualified, params),
            Some((type_text, None)) => format!("{} {}", type_text, qualified),
            None => qualified,
        };
        let start = match type_start {
            Some(idx) => self.modifiers_start(idx),
            None => token.start,
        };
        let documentation = if kind == SymbolKind::Local {
            String::new()
        } else {
            self.documentation(start)
        };

        let idx = self.declarations.len();
        self.declarations.push(Declaration {
            name: token.text.to_string(),
            kind,
            name_start: token.start,
            name_end: token.end,
            start,
            end: token.end,
            namespace,
            containers,
            parent: self.parent(),
            signature,
            documentation,
            is_partial: false,
        });
        idx
    }

    /// Enum members are bare names following `{` or `,` inside an enum body.
    fn enum_member(&self, i: usize) -> Option<SymbolKind> {
        let scope = self.scopes.last()?;
        if !matches!(scope.kind, ScopeKind::Type { kind: SymbolKind::Enum, .. }) {
            return None;
        }
        let prev = self.tokens.get(i.checked_sub(1)?)?;
        (prev.is("{") || prev.is(",")).then_some(SymbolKind::Field)
    }

    /// Index of the first token of a type ending at token `end`, if the
    /// tokens there look like a type.
    fn type_start(&self, end: usize) -> Option<usize> {
        let token = self.tokens[end];
        let mut start = if token.is_ident() {
            if KEYWORDS.contains(&token.text) {
                return None;
            }
            end
        } else if token.is("]") {
            // `T[]`
            let open = end.checked_sub(1)?;
            if !self.tokens[open].is("[") {
                return None;
            }
            return self.type_start(open.checked_sub(1)?);
        } else if token.is(">") {
            self.generic_start(end)?
        } else {
            return None;
        };

        // Qualified names: `System.String`.
        while start >= 2 && self.tokens[start - 1].is(".") && self.tokens[start - 2].is_name() {
            start -= 2;
        }
        Some(start)
    }

    /// Walks back from a closing `>` to the generic type name before the
    /// matching `<`.
    fn generic_start(&self, close: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut j = close;
        loop {
            let token = self.tokens[j];
            if token.is(">") {
                depth += 1;
            } else if token.is("<") {
                depth -= 1;
                if depth == 0 {
                    let name = self.tokens.get(j.checked_sub(1)?)?;
                    return name.is_name().then(|| j - 1);
                }
            } else if !(token.is_ident() || token.is(",") || token.is(".")) {
                return None;
            }
            j = j.checked_sub(1)?;
        }
    }

    /// Text between the parentheses starting at token `open`, whitespace
    /// collapsed.
    fn parameter_text(&self, open: usize) -> Option<String> {
        let mut depth = 0usize;
        for (j, token) in self.tokens.iter().enumerate().skip(open) {
            if token.is("(") {
                depth += 1;
            } else if token.is(")") {
                depth -= 1;
                if depth == 0 {
                    let inner = &self.text[self.tokens[open].end..self.tokens[j].start];
                    return Some(inner.split_whitespace().collect::<Vec<_>>().join(" "));
                }
            }
        }
        None
    }

    /// Start offset of the modifiers preceding token `idx`.
    fn modifiers_start(&self, idx: usize) -> usize {
        let mut j = idx;
        while j > 0 && MODIFIERS.contains(&self.tokens[j - 1].text) {
            j -= 1;
        }
        self.tokens[j].start
    }

    fn token_index(&self, offset: usize) -> usize {
        self.tokens
            .iter()
            .position(|t| t.start == offset)
            .unwrap_or(0)
    }

    fn dotted_name(&self, from: usize) -> (String, usize) {
        let mut name = String::new();
        let mut j = from;
        while let Some(token) = self.tokens.get(j) {
            if !token.is_ident() {
                break;
            }
            name.push_str(token.text);
            if self.tokens.get(j + 1).is_some_and(|t| t.is(".")) {
                name.push('.');
                j += 2;
            } else {
                j += 1;
                break;
            }
        }
        (name.trim_end_matches('.').to_string(), j)
    }

    /// `///` lines directly above the line containing `start`, with XML tags
    /// stripped. Attribute lines in between are skipped.
    fn documentation(&self, start: usize) -> String {
        let line_start = self.text[..start].rfind('\n').map_or(0, |i| i + 1);
        let mut lines = Vec::new();
        for line in self.text[..line_start].lines().rev() {
            let trimmed = line.trim();
            if let Some(doc) = trimmed.strip_prefix("///") {
                lines.push(doc.trim().to_string());
            } else if trimmed.starts_with('[') {
                continue;
            } else {
                break;
            }
        }
        lines.reverse();
        let joined = lines.join(" ");
        XML_TAG
            .replace_all(&joined, "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn current_namespace(&self) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| match &s.kind {
                ScopeKind::Namespace(name) => Some(name.clone()),
                _ => None,
            })
            .or_else(|| self.file_namespace.clone())
    }

    fn containers(&self) -> Vec<String> {
        self.scopes
            .iter()
            .filter_map(|s| match &s.kind {
                ScopeKind::Type { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn innermost_is_type(&self) -> bool {
        self.scopes
            .last()
            .is_some_and(|s| matches!(s.kind, ScopeKind::Type { .. }))
    }

    fn parent(&self) -> Option<usize> {
        self.scopes.iter().rev().find_map(|s| s.declaration)
    }
}

fn qualify(namespace: Option<&str>, containers: &[String], name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(namespace) = namespace {
        parts.push(namespace);
    }
    parts.extend(containers.iter().map(String::as_str));
    parts.push(name);
    parts.join(".")
}
