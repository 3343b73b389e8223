//! File System Scanner
//!
//! In-memory virtual file table with lightweight static analysis. Facts
//! about a file (language, imports, functions, issues) are extracted by
//! pattern matching, not real parsing. The heuristics are deliberately
//! approximate and recomputed in full whenever a file's content changes.

use regex::Regex;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Extensions that trigger eager code analysis on write
const CODE_EXTENSIONS: [&str; 14] = [
    "js", "jsx", "ts", "tsx", "py", "java", "cpp", "c", "go", "rs", "rb", "php", "swift", "kt",
];

/// Entry kind in the virtual table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
}

/// Metadata for one tracked file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub size: Option<u64>,
    pub extension: Option<String>,
    pub language: Option<String>,
    pub last_modified: Option<i64>,
}

/// Nested view over the flat path table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTree {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub path: String,
    pub children: Option<Vec<FileTree>>,
}

/// Static-analysis facts for one file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAnalysis {
    pub path: String,
    pub language: String,
    pub lines: usize,
    pub complexity: usize,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub issues: Vec<String>,
}

/// Compiled extraction patterns, built once per scanner
struct AnalysisPatterns {
    complexity: Vec<Regex>,
    js_import: Regex,
    js_simple_import: Regex,
    py_import: Regex,
    js_named_export: Regex,
    js_direct_export: Regex,
    js_function: Regex,
    js_arrow_function: Regex,
    py_function: Regex,
    js_class: Regex,
    py_class: Regex,
    ts_any: Regex,
}

impl AnalysisPatterns {
    fn compile() -> Result<Self, EngineError> {
        // Complexity tokens are matched with word boundaries on both sides,
        // so "a && b" (operator flanked by spaces) does not count while
        // "a&&b" does. Kept as-is for parity with historical scores.
        let complexity_tokens = [
            r"\bif\b", r"\belse\b", r"\bfor\b", r"\bwhile\b", r"\bcase\b", r"\bcatch\b",
            r"\b&&\b", r"\b\|\|\b", r"\b\?\b",
        ];

        let complexity = complexity_tokens
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            complexity,
            js_import: compile(r#"import\s+.*?\s+from\s+['"](.+?)['"]"#)?,
            js_simple_import: compile(r#"import\s+['"](.+?)['"]"#)?,
            py_import: compile(r"(?:from\s+(\S+)\s+)?import\s+(.+)")?,
            js_named_export: compile(r"export\s+\{\s*([^}]+)\s*\}")?,
            js_direct_export: compile(r"export\s+(?:async\s+)?(?:function|class|const|let|var)\s+(\w+)")?,
            js_function: compile(r"(?:async\s+)?function\s+(\w+)")?,
            js_arrow_function: compile(r"const\s+(\w+)\s*=\s*(?:async\s*)?\([^)]*\)\s*=>")?,
            py_function: compile(r"def\s+(\w+)\s*\(")?,
            js_class: compile(r"class\s+(\w+)")?,
            py_class: compile(r"class\s+(\w+)\s*[:(]")?,
            ts_any: compile(r":\s*any")?,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, EngineError> {
    Regex::new(pattern)
        .map_err(|e| EngineError::Config(format!("invalid analysis pattern: {}", e)))
}

/// Virtual file table with eager per-file analysis
pub struct FileSystemScanner {
    root_path: String,
    files: HashMap<String, FileInfo>,
    order: Vec<String>,
    contents: HashMap<String, String>,
    analyses: HashMap<String, CodeAnalysis>,
    patterns: AnalysisPatterns,
}

impl FileSystemScanner {
    pub fn new(root_path: impl Into<String>) -> Result<Self, EngineError> {
        Ok(Self {
            root_path: root_path.into(),
            files: HashMap::new(),
            order: Vec::new(),
            contents: HashMap::new(),
            analyses: HashMap::new(),
            patterns: AnalysisPatterns::compile()?,
        })
    }

    /// Upsert a file and its content. Code files are re-analyzed eagerly.
    pub fn add_file(&mut self, path: &str, content: &str) {
        let info = extract_file_info(path);
        if !self.files.contains_key(path) {
            self.order.push(path.to_string());
        }
        self.files.insert(path.to_string(), info);
        self.contents.insert(path.to_string(), content.to_string());

        if is_code_file(path) {
            let analysis = self.analyze_content(path, content);
            self.analyses.insert(path.to_string(), analysis);
        }
    }

    /// Synonym of `add_file`.
    pub fn write_file(&mut self, path: &str, content: &str) {
        self.add_file(path, content);
    }

    /// Content of a tracked file.
    pub fn read_file(&self, path: &str) -> Result<String, EngineError> {
        self.contents
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::FileNotFound(path.to_string()))
    }

    /// Drop a file and every derived record.
    pub fn delete_file(&mut self, path: &str) {
        self.files.remove(path);
        self.contents.remove(path);
        self.analyses.remove(path);
        self.order.retain(|p| p != path);
    }

    /// Recompute the analysis for a tracked file.
    pub fn analyze_file(&mut self, path: &str) -> Result<CodeAnalysis, EngineError> {
        let content = self.read_file(path)?;
        let analysis = self.analyze_content(path, &content);
        self.analyses.insert(path.to_string(), analysis.clone());
        Ok(analysis)
    }

    /// Cached analysis, if the file was analyzable.
    pub fn get_analysis(&self, path: &str) -> Option<&CodeAnalysis> {
        self.analyses.get(path)
    }

    /// All tracked files in insertion order.
    pub fn get_file_list(&self) -> Vec<FileInfo> {
        self.order
            .iter()
            .filter_map(|p| self.files.get(p))
            .cloned()
            .collect()
    }

    /// Nested tree built from the flat path table.
    pub fn get_tree(&self) -> FileTree {
        let mut root = FileTree {
            name: "root".to_string(),
            file_type: FileType::Directory,
            path: self.root_path.clone(),
            children: Some(Vec::new()),
        };

        for path in &self.order {
            if let Some(info) = self.files.get(path) {
                add_to_tree(&mut root, path, info);
            }
        }

        root
    }

    /// Most frequent detected language across tracked files; ties keep the
    /// first-seen language.
    pub fn detect_primary_language(&self) -> String {
        let mut counts: Vec<(String, usize)> = Vec::new();

        for path in &self.order {
            let Some(language) = self.files.get(path).and_then(|f| f.language.clone()) else {
                continue;
            };
            match counts.iter_mut().find(|(l, _)| *l == language) {
                Some((_, count)) => *count += 1,
                None => counts.push((language, 1)),
            }
        }

        let mut max_count = 0;
        let mut primary = "unknown".to_string();
        for (language, count) in counts {
            if count > max_count {
                max_count = count;
                primary = language;
            }
        }

        primary
    }

    /// Sniff the framework from the literal text of package.json or the
    /// presence of known config filenames.
    pub fn detect_framework(&self) -> String {
        if self.order.iter().any(|p| p.contains("package.json")) {
            if let Some(package_json) = self.contents.get("package.json") {
                if package_json.contains("\"react\"") {
                    return "React".to_string();
                }
                if package_json.contains("\"vue\"") {
                    return "Vue".to_string();
                }
                if package_json.contains("\"angular\"") {
                    return "Angular".to_string();
                }
                if package_json.contains("\"next\"") {
                    return "Next.js".to_string();
                }
            }
        }

        if self.order.iter().any(|p| p.contains("vite.config")) {
            return "Vite".to_string();
        }
        if self.order.iter().any(|p| p.contains("webpack.config")) {
            return "Webpack".to_string();
        }

        "unknown".to_string()
    }

    fn analyze_content(&self, path: &str, content: &str) -> CodeAnalysis {
        let language = language_for_path(path);
        let lines = content.split('\n').count();

        let functions = self.extract_functions(content, &language);
        let issues = self.detect_issues(content, &language, &functions, lines);

        CodeAnalysis {
            path: path.to_string(),
            language: language.clone(),
            lines,
            complexity: self.calculate_complexity(content),
            imports: self.extract_imports(content, &language),
            exports: self.extract_exports(content, &language),
            functions,
            classes: self.extract_classes(content, &language),
            issues,
        }
    }

    /// Cyclomatic complexity approximation: 1 + one per matched
    /// branch keyword or short-circuit operator token.
    fn calculate_complexity(&self, content: &str) -> usize {
        let mut complexity = 1;
        for pattern in &self.patterns.complexity {
            complexity += pattern.find_iter(content).count();
        }
        complexity
    }

    fn extract_imports(&self, content: &str, language: &str) -> Vec<String> {
        let mut imports = Vec::new();

        if language == "javascript" || language == "typescript" {
            for cap in self.patterns.js_import.captures_iter(content) {
                imports.push(cap[1].to_string());
            }
            for cap in self.patterns.js_simple_import.captures_iter(content) {
                let import = cap[1].to_string();
                if !imports.contains(&import) {
                    imports.push(import);
                }
            }
        }

        if language == "python" {
            for cap in self.patterns.py_import.captures_iter(content) {
                let import = match cap.get(1) {
                    Some(module) => module.as_str().to_string(),
                    None => cap[2]
                        .split(',')
                        .next()
                        .unwrap_or("")
                        .trim()
                        .to_string(),
                };
                imports.push(import);
            }
        }

        imports
    }

    fn extract_exports(&self, content: &str, language: &str) -> Vec<String> {
        let mut exports = Vec::new();

        if language == "javascript" || language == "typescript" {
            for cap in self.patterns.js_named_export.captures_iter(content) {
                exports.extend(cap[1].split(',').map(|n| n.trim().to_string()));
            }
            for cap in self.patterns.js_direct_export.captures_iter(content) {
                exports.push(cap[1].to_string());
            }
            if content.contains("export default") {
                exports.push("default".to_string());
            }
        }

        exports
    }

    fn extract_functions(&self, content: &str, language: &str) -> Vec<String> {
        let mut functions = Vec::new();

        if language == "javascript" || language == "typescript" {
            for cap in self.patterns.js_function.captures_iter(content) {
                functions.push(cap[1].to_string());
            }
            for cap in self.patterns.js_arrow_function.captures_iter(content) {
                functions.push(cap[1].to_string());
            }
        }

        if language == "python" {
            for cap in self.patterns.py_function.captures_iter(content) {
                functions.push(cap[1].to_string());
            }
        }

        functions
    }

    fn extract_classes(&self, content: &str, language: &str) -> Vec<String> {
        let mut classes = Vec::new();

        if language == "javascript" || language == "typescript" {
            for cap in self.patterns.js_class.captures_iter(content) {
                classes.push(cap[1].to_string());
            }
        }

        if language == "python" {
            for cap in self.patterns.py_class.captures_iter(content) {
                classes.push(cap[1].to_string());
            }
        }

        classes
    }

    fn detect_issues(
        &self,
        content: &str,
        language: &str,
        functions: &[String],
        lines: usize,
    ) -> Vec<String> {
        let mut issues = Vec::new();

        if content.contains("console.log") && language == "javascript" {
            issues.push("Contains console.log statements".to_string());
        }

        if content.contains("TODO") || content.contains("FIXME") {
            issues.push("Contains TODO/FIXME comments".to_string());
        }

        if language == "typescript" && content.contains("any") {
            let any_count = self.patterns.ts_any.find_iter(content).count();
            if any_count > 3 {
                issues.push(format!(
                    "Excessive use of 'any' type ({} occurrences)",
                    any_count
                ));
            }
        }

        if !functions.is_empty() {
            let avg_lines_per_func = lines as f64 / functions.len() as f64;
            if avg_lines_per_func > 50.0 {
                issues.push("Contains long functions (consider refactoring)".to_string());
            }
        }

        issues
    }
}

fn extract_file_info(path: &str) -> FileInfo {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    let extension = if name.contains('.') {
        name.rsplit('.').next().map(str::to_string)
    } else {
        None
    };
    let language = extension
        .as_ref()
        .map(|_| language_for_path(path))
        .filter(|l| l != "unknown");

    FileInfo {
        path: path.to_string(),
        name,
        file_type: FileType::File,
        size: None,
        extension,
        language,
        last_modified: Some(chrono::Utc::now().timestamp_millis()),
    }
}

fn language_for_path(path: &str) -> String {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();

    let language = match ext.as_str() {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "md" => "markdown",
        _ => "unknown",
    };

    language.to_string()
}

fn is_code_file(path: &str) -> bool {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    CODE_EXTENSIONS.contains(&ext.as_str())
}

fn add_to_tree(tree: &mut FileTree, path: &str, info: &FileInfo) {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let mut current = tree;

    for (i, part) in parts.iter().enumerate() {
        let is_last = i == parts.len() - 1;
        let children = current.children.get_or_insert_with(Vec::new);

        let idx = match children.iter().position(|c| c.name == *part) {
            Some(idx) => idx,
            None => {
                children.push(FileTree {
                    name: part.to_string(),
                    file_type: if is_last {
                        info.file_type
                    } else {
                        FileType::Directory
                    },
                    path: parts[..=i].join("/"),
                    children: if is_last { None } else { Some(Vec::new()) },
                });
                children.len() - 1
            }
        };

        current = &mut children[idx];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> FileSystemScanner {
        FileSystemScanner::new("/").expect("patterns compile")
    }

    #[test]
    fn test_add_read_delete() {
        let mut fs = scanner();
        fs.add_file("src/app.ts", "const x = 1;");

        assert_eq!(fs.read_file("src/app.ts").unwrap(), "const x = 1;");
        assert!(fs.get_analysis("src/app.ts").is_some());

        fs.delete_file("src/app.ts");
        let err = fs.read_file("src/app.ts").unwrap_err();
        assert_eq!(err.to_string(), "File not found: src/app.ts");
        assert!(fs.get_analysis("src/app.ts").is_none());
        assert!(fs.get_file_list().is_empty());
    }

    #[test]
    fn test_write_recomputes_analysis() {
        let mut fs = scanner();
        fs.write_file("a.js", "let x = 1;");
        let before = fs.get_analysis("a.js").unwrap().complexity;

        fs.write_file("a.js", "if (x) { y(); } else { z(); }");
        let after = fs.get_analysis("a.js").unwrap().complexity;

        assert_eq!(before, 1);
        assert_eq!(after, 3);
    }

    #[test]
    fn test_non_code_files_not_analyzed() {
        let mut fs = scanner();
        fs.add_file("notes.md", "# if else for while");
        assert!(fs.get_analysis("notes.md").is_none());
        assert_eq!(fs.read_file("notes.md").unwrap(), "# if else for while");
    }

    #[test]
    fn test_language_detection() {
        let mut fs = scanner();
        fs.add_file("a.tsx", "");
        fs.add_file("b.py", "");
        fs.add_file("c.rs", "");

        let list = fs.get_file_list();
        assert_eq!(list[0].language.as_deref(), Some("typescript"));
        assert_eq!(list[1].language.as_deref(), Some("python"));
        assert_eq!(list[2].language.as_deref(), Some("rust"));
    }

    #[test]
    fn test_complexity_operator_quirk() {
        let fs = scanner();
        // Operators count only when directly flanked by word characters
        assert_eq!(fs.calculate_complexity("a&&b"), 2);
        assert_eq!(fs.calculate_complexity("a && b"), 1);
        assert_eq!(fs.calculate_complexity("if (x) { } else { }"), 3);
    }

    #[test]
    fn test_extract_imports_javascript() {
        let fs = scanner();
        let content = "import { useState } from 'react';\nimport 'styles.css';\n";
        let imports = fs.extract_imports(content, "javascript");
        assert_eq!(imports, vec!["react", "styles.css"]);
    }

    #[test]
    fn test_extract_imports_python() {
        let fs = scanner();
        let imports = fs.extract_imports("from os import path\n", "python");
        assert_eq!(imports, vec!["os"]);

        let imports = fs.extract_imports("import json, sys\n", "python");
        assert_eq!(imports, vec!["json"]);
    }

    #[test]
    fn test_extract_exports() {
        let fs = scanner();
        let content = "export { alpha, beta }\nexport const gamma = 1;\nexport default thing;";
        let exports = fs.extract_exports(content, "typescript");
        assert_eq!(exports, vec!["alpha", "beta", "gamma", "default"]);
    }

    #[test]
    fn test_extract_functions() {
        let fs = scanner();
        let content = "async function load() {}\nconst render = (props) => {}\n";
        let functions = fs.extract_functions(content, "javascript");
        assert_eq!(functions, vec!["load", "render"]);

        let functions = fs.extract_functions("def handler(event):\n    pass\n", "python");
        assert_eq!(functions, vec!["handler"]);
    }

    #[test]
    fn test_extract_classes() {
        let fs = scanner();
        assert_eq!(
            fs.extract_classes("class Cart extends Base {}", "typescript"),
            vec!["Cart"]
        );
        assert_eq!(
            fs.extract_classes("class Handler(Base):", "python"),
            vec!["Handler"]
        );
    }

    #[test]
    fn test_issue_console_log_only_for_javascript() {
        let mut fs = scanner();
        fs.add_file("a.js", "console.log('x');");
        fs.add_file("b.ts", "console.log('x');");

        let a = fs.get_analysis("a.js").unwrap();
        assert!(a.issues.contains(&"Contains console.log statements".to_string()));

        let b = fs.get_analysis("b.ts").unwrap();
        assert!(!b.issues.contains(&"Contains console.log statements".to_string()));
    }

    #[test]
    fn test_issue_todo_marker() {
        let mut fs = scanner();
        fs.add_file("a.js", "// TODO tighten this up");
        let analysis = fs.get_analysis("a.js").unwrap();
        assert!(analysis
            .issues
            .contains(&"Contains TODO/FIXME comments".to_string()));
    }

    #[test]
    fn test_issue_excessive_any() {
        let mut fs = scanner();
        let content = "let a: any; let b: any; let c: any; let d: any;";
        fs.add_file("a.ts", content);

        let analysis = fs.get_analysis("a.ts").unwrap();
        assert!(analysis
            .issues
            .iter()
            .any(|i| i.starts_with("Excessive use of 'any' type (4")));

        // Three occurrences stay under the threshold
        let mut fs = scanner();
        fs.add_file("b.ts", "let a: any; let b: any; let c: any;");
        assert!(fs.get_analysis("b.ts").unwrap().issues.is_empty());
    }

    #[test]
    fn test_issue_long_functions() {
        let mut fs = scanner();
        let mut content = String::from("function big() {\n");
        for _ in 0..60 {
            content.push_str("  work();\n");
        }
        content.push_str("}\n");
        fs.add_file("a.js", &content);

        let analysis = fs.get_analysis("a.js").unwrap();
        assert!(analysis
            .issues
            .contains(&"Contains long functions (consider refactoring)".to_string()));
    }

    #[test]
    fn test_primary_language_tie_keeps_first_seen() {
        let mut fs = scanner();
        fs.add_file("a.js", "");
        fs.add_file("b.py", "");
        assert_eq!(fs.detect_primary_language(), "javascript");

        fs.add_file("c.py", "");
        assert_eq!(fs.detect_primary_language(), "python");
    }

    #[test]
    fn test_primary_language_empty_table() {
        let fs = scanner();
        assert_eq!(fs.detect_primary_language(), "unknown");
    }

    #[test]
    fn test_detect_framework() {
        let mut fs = scanner();
        fs.add_file("package.json", "{\"dependencies\":{\"react\":\"18\"}}");
        assert_eq!(fs.detect_framework(), "React");

        let mut fs = scanner();
        fs.add_file("vite.config.ts", "export default {}");
        assert_eq!(fs.detect_framework(), "Vite");

        let fs = scanner();
        assert_eq!(fs.detect_framework(), "unknown");
    }

    #[test]
    fn test_tree_nesting() {
        let mut fs = scanner();
        fs.add_file("src/components/Card.tsx", "");
        fs.add_file("src/index.ts", "");

        let tree = fs.get_tree();
        let children = tree.children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "src");
        assert_eq!(children[0].file_type, FileType::Directory);

        let src_children = children[0].children.as_ref().unwrap();
        assert_eq!(src_children.len(), 2);
        assert_eq!(src_children[0].name, "components");
        assert_eq!(src_children[1].name, "index.ts");
        assert_eq!(src_children[1].file_type, FileType::File);
        assert_eq!(
            src_children[0].children.as_ref().unwrap()[0].path,
            "src/components/Card.tsx"
        );
    }

    #[test]
    fn test_analyze_file_missing() {
        let mut fs = scanner();
        assert!(matches!(
            fs.analyze_file("ghost.ts"),
            Err(EngineError::FileNotFound(_))
        ));
    }
}
