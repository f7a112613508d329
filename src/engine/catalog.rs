//! In-memory description of compiled assemblies
//!
//! The lexical engine cannot read binaries, so the types a referenced
//! assembly exposes are described here. [`CatalogDecompiler`] renders those
//! descriptions back into C# source.

use std::fmt::Write;
use std::path::Path;

use serde::Deserialize;

use crate::engine::SymbolKind;
use crate::engine::error::DecompileError;
use crate::engine::Decompiler;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogMember {
    pub name: String,
    pub kind: SymbolKind,
    /// Declaration as it would appear in source, without the trailing `;`,
    /// e.g. `public void Baz()`.
    pub signature: String,
}

impl CatalogMember {
    pub fn new(name: impl Into<String>, kind: SymbolKind, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            signature: signature.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogType {
    pub qualified_name: String,
    pub kind: SymbolKind,
    #[serde(default)]
    pub members: Vec<CatalogMember>,
}

impl CatalogType {
    pub fn new(qualified_name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            kind,
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, member: CatalogMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn name(&self) -> &str {
        self.qualified_name
            .rsplit_once('.')
            .map_or(self.qualified_name.as_str(), |(_, name)| name)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.qualified_name.rsplit_once('.').map(|(ns, _)| ns)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogAssembly {
    pub name: String,
    #[serde(default)]
    pub types: Vec<CatalogType>,
}

impl CatalogAssembly {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, ty: CatalogType) -> Self {
        self.types.push(ty);
        self
    }

    pub fn find_type(&self, qualified_name: &str) -> Option<&CatalogType> {
        self.types.iter().find(|t| t.qualified_name == qualified_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssemblyCatalog {
    #[serde(default)]
    assemblies: Vec<CatalogAssembly>,
}

impl AssemblyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a catalog description:
    ///
    /// ```json
    /// { "assemblies": [{ "name": "Lib", "types": [{ "qualifiedName": "Ns.Bar",
    ///   "kind": "class", "members": [{ "name": "Baz", "kind": "method",
    ///   "signature": "public void Baz()" }] }] }] }
    /// ```
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn with_assembly(mut self, assembly: CatalogAssembly) -> Self {
        self.assemblies.push(assembly);
        self
    }

    pub fn assemblies(&self) -> &[CatalogAssembly] {
        &self.assemblies
    }

    pub fn assembly(&self, name: &str) -> Option<&CatalogAssembly> {
        self.assemblies.iter().find(|a| a.name == name)
    }

    /// Whether some assembly declares types in `namespace`.
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.assemblies
            .iter()
            .flat_map(|a| &a.types)
            .any(|t| t.namespace() == Some(namespace))
    }
}

/// Renders catalog types as C# declarations.
#[derive(Debug, Clone, Default)]
pub struct CatalogDecompiler {
    catalog: AssemblyCatalog,
}

impl CatalogDecompiler {
    pub fn new(catalog: AssemblyCatalog) -> Self {
        Self { catalog }
    }

    fn render(binary_path: &Path, ty: &CatalogType) -> String {
        let keyword = ty.kind.keyword().unwrap_or("class");
        let file_name = binary_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut out = String::new();
        let _ = writeln!(out, "// Decompiled from {}", file_name);
        let indent = match ty.namespace() {
            Some(namespace) => {
                let _ = writeln!(out, "namespace {}\n{{", namespace);
                "    "
            }
            None => "",
        };

        let _ = writeln!(out, "{}public {} {}", indent, keyword, ty.name());
        let _ = writeln!(out, "{}{{", indent);
        for member in &ty.members {
            let _ = writeln!(out, "{}    {};", indent, member.signature);
        }
        let _ = writeln!(out, "{}}}", indent);

        if ty.namespace().is_some() {
            out.push_str("}\n");
        }
        out
    }
}

impl Decompiler for CatalogDecompiler {
    fn decompile_type(&self, binary_path: &Path, type_name: &str) -> Result<String, DecompileError> {
        let assembly_name = binary_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| DecompileError::AssemblyNotFound(binary_path.to_path_buf()))?;

        let assembly = self
            .catalog
            .assembly(&assembly_name)
            .ok_or_else(|| DecompileError::AssemblyNotFound(binary_path.to_path_buf()))?;

        let ty = assembly
            .find_type(type_name)
            .ok_or_else(|| DecompileError::TypeNotFound {
                assembly: assembly_name.clone(),
                type_name: type_name.to_string(),
            })?;

        Ok(Self::render(binary_path, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> AssemblyCatalog {
        AssemblyCatalog::new().with_assembly(
            CatalogAssembly::new("Lib").with_type(
                CatalogType::new("Ns.Bar", SymbolKind::Class)
                    .with_member(CatalogMember::new("Baz", SymbolKind::Method, "public void Baz()"))
                    .with_member(CatalogMember::new("Count", SymbolKind::Field, "public int Count")),
            ),
        )
    }

    #[test]
    fn decompile_type_renders_namespace_type_and_members() {
        let decompiler = CatalogDecompiler::new(catalog());
        let text = decompiler
            .decompile_type(Path::new("/refs/Lib.dll"), "Ns.Bar")
            .unwrap();

        assert_eq!(
            text,
            "// Decompiled from Lib.dll\n\
             namespace Ns\n\
             {\n\
             \x20   public class Bar\n\
             \x20   {\n\
             \x20       public void Baz();\n\
             \x20       public int Count;\n\
             \x20   }\n\
             }\n"
        );
    }

    #[test]
    fn decompile_type_is_deterministic() {
        let decompiler = CatalogDecompiler::new(catalog());
        let path = Path::new("/refs/Lib.dll");
        assert_eq!(
            decompiler.decompile_type(path, "Ns.Bar").unwrap(),
            decompiler.decompile_type(path, "Ns.Bar").unwrap()
        );
    }

    #[test]
    fn decompile_type_reports_unknown_assembly() {
        let decompiler = CatalogDecompiler::new(catalog());
        let result = decompiler.decompile_type(Path::new("/refs/Other.dll"), "Ns.Bar");
        assert!(matches!(result, Err(DecompileError::AssemblyNotFound(_))));
    }

    #[test]
    fn decompile_type_reports_unknown_type() {
        let decompiler = CatalogDecompiler::new(catalog());
        let result = decompiler.decompile_type(Path::new("/refs/Lib.dll"), "Ns.Missing");
        assert!(matches!(result, Err(DecompileError::TypeNotFound { .. })));
    }

    #[test]
    fn from_json_reads_nested_description() {
        let parsed = AssemblyCatalog::from_json(
            r#"{
                "assemblies": [{
                    "name": "Lib",
                    "types": [{
                        "qualifiedName": "Ns.Bar",
                        "kind": "class",
                        "members": [
                            { "name": "Baz", "kind": "method", "signature": "public void Baz()" },
                            { "name": "Count", "kind": "field", "signature": "public int Count" }
                        ]
                    }]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(parsed, catalog());
        assert!(AssemblyCatalog::from_json(r#"{ "assemblies": [{ "types": [] }] }"#).is_err());
    }

    #[test]
    fn has_namespace_checks_type_namespaces() {
        assert!(catalog().has_namespace("Ns"));
        assert!(!catalog().has_namespace("Other"));
    }
}
