//! Built-in plugins
//!
//! Three capabilities ship with the engine: code quality analysis,
//! component scaffolding, and performance anti-pattern detection. All are
//! heuristic string analysis over the loosely-typed parameter map.

use async_trait::async_trait;
use regex::Regex;
use sdk::errors::EngineError;
use sdk::plugin::{PluginConfig, PluginHandler, PluginMetadata};
use semver::Version;
use serde_json::{json, Value};
use std::sync::Arc;

type BuiltIn = (PluginMetadata, PluginConfig, Arc<dyn PluginHandler>);

/// The built-in plugin set installed by `PluginRegistry::load_plugins`.
pub fn built_in_plugins() -> Result<Vec<BuiltIn>, EngineError> {
    let mut generator_settings = serde_json::Map::new();
    generator_settings.insert("framework".to_string(), json!("react"));
    generator_settings.insert("typescript".to_string(), json!(true));
    generator_settings.insert("styling".to_string(), json!("tailwind"));

    Ok(vec![
        (
            metadata(
                "code-analysis",
                "Code Analysis",
                "Analyzes code quality and suggests improvements",
                &["analyze", "suggest", "refactor"],
                &["read:files"],
            ),
            PluginConfig::default(),
            Arc::new(CodeAnalysisPlugin::new()?) as Arc<dyn PluginHandler>,
        ),
        (
            metadata(
                "component-generator",
                "Component Generator",
                "Generates UI components from specifications",
                &["generate", "scaffold"],
                &["write:files"],
            ),
            PluginConfig {
                enabled: true,
                settings: generator_settings,
            },
            Arc::new(ComponentGeneratorPlugin) as Arc<dyn PluginHandler>,
        ),
        (
            metadata(
                "performance-analyzer",
                "Performance Analyzer",
                "Analyzes and optimizes code performance",
                &["analyze", "optimize"],
                &["read:files", "write:files"],
            ),
            PluginConfig::default(),
            Arc::new(PerformanceAnalyzerPlugin::new()?) as Arc<dyn PluginHandler>,
        ),
    ])
}

fn metadata(
    id: &str,
    name: &str,
    description: &str,
    capabilities: &[&str],
    permissions: &[&str],
) -> PluginMetadata {
    PluginMetadata {
        id: id.to_string(),
        name: name.to_string(),
        version: Version::new(1, 0, 0),
        description: description.to_string(),
        author: "Steward".to_string(),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        required_permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, EngineError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::Plugin(format!("missing '{}' parameter", key)))
}

/// Code quality scoring and suggestions
pub struct CodeAnalysisPlugin {
    complexity: Vec<Regex>,
}

impl CodeAnalysisPlugin {
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            complexity: complexity_patterns()?,
        })
    }

    fn quality_score(&self, code: &str) -> i64 {
        let mut score: i64 = 100;

        if code.contains("any") {
            score -= 10;
        }
        if code.contains("console.log") {
            score -= 5;
        }
        if !code.contains("//") && !code.contains("/*") {
            score -= 10;
        }
        if code.len() > 1000 && !code.contains("\n\n") {
            score -= 5;
        }

        score.max(0)
    }

    fn suggestions(&self, code: &str, language: &str) -> Vec<String> {
        let mut suggestions = Vec::new();

        if language == "typescript" && code.contains("any") {
            suggestions
                .push("Replace \"any\" types with specific types for better type safety".to_string());
        }

        if code.contains("console.log") {
            suggestions
                .push("Remove console.log statements or use a proper logging library".to_string());
        }

        if !code.contains("//") && !code.contains("/*") && code.len() > 100 {
            suggestions.push("Add comments to explain complex logic".to_string());
        }

        let long_lines = code.lines().filter(|l| l.len() > 120).count();
        if long_lines > 0 {
            suggestions.push(format!(
                "Break down long lines ({} lines exceed 120 characters)",
                long_lines
            ));
        }

        suggestions
    }

    fn maintainability(&self, code: &str) -> f64 {
        let lines = code.split('\n').count() as f64;
        let complexity = count_complexity(&self.complexity, code) as f64;
        let comment_lines = code.matches("//").count() as f64;
        let comment_ratio = comment_lines / lines;

        let mut maintainability = 100.0;
        maintainability -= complexity * 2.0;
        maintainability -= ((lines - 100.0) / 10.0).max(0.0);
        maintainability += comment_ratio * 20.0;

        maintainability.clamp(0.0, 100.0)
    }
}

#[async_trait]
impl PluginHandler for CodeAnalysisPlugin {
    async fn execute(&self, params: Value) -> Result<Value, EngineError> {
        let code = required_str(&params, "code")?;
        let language = params
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        Ok(json!({
            "quality": self.quality_score(code),
            "suggestions": self.suggestions(code, language),
            "metrics": {
                "lines": code.split('\n').count(),
                "complexity": count_complexity(&self.complexity, code),
                "maintainability": self.maintainability(code),
            },
        }))
    }
}

/// Component scaffolding from a name and a props map
pub struct ComponentGeneratorPlugin;

#[async_trait]
impl PluginHandler for ComponentGeneratorPlugin {
    async fn execute(&self, params: Value) -> Result<Value, EngineError> {
        let name = required_str(&params, "name")?;

        let props: Vec<String> = params
            .get("props")
            .and_then(|v| v.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(key, ty)| {
                        format!("  {}: {};", key, ty.as_str().unwrap_or("unknown"))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let body = [
            "import React from 'react';",
            "",
            "interface {name}Props {",
            "{props}",
            "}",
            "",
            "export const {name}: React.FC<{name}Props> = (props) => {",
            "  return (",
            "    <div className=\"p-4\">",
            "      <h2 className=\"text-xl font-semibold\">{name}</h2>",
            "      {/* Component implementation */}",
            "    </div>",
            "  );",
            "};",
            "",
            "export default {name};",
        ]
        .join("\n");

        let component = body
            .replace("{name}", name)
            .replace("{props}", &props.join("\n"));

        Ok(json!({
            "component": component,
            "filename": format!("{}.tsx", name),
            "type": "react-component",
        }))
    }
}

/// Performance anti-pattern detection
pub struct PerformanceAnalyzerPlugin {
    state_calls: Regex,
}

impl PerformanceAnalyzerPlugin {
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            state_calls: Regex::new(r"setState|useState")
                .map_err(|e| EngineError::Plugin(format!("invalid pattern: {}", e)))?,
        })
    }
}

#[async_trait]
impl PluginHandler for PerformanceAnalyzerPlugin {
    async fn execute(&self, params: Value) -> Result<Value, EngineError> {
        let code = required_str(&params, "code")?;

        let mut issues: Vec<String> = Vec::new();
        let mut optimizations: Vec<String> = Vec::new();

        if code.contains("console.log") {
            issues.push("Contains console.log statements that impact performance".to_string());
            optimizations.push("Remove console.log statements in production".to_string());
        }

        if code.contains("for") && code.contains(".push(") {
            issues.push("Array operations inside loops can be inefficient".to_string());
            optimizations.push("Consider using map/filter/reduce for array operations".to_string());
        }

        if code.contains("useEffect") && !code.contains("[]") {
            issues.push("useEffect without dependency array may cause infinite renders".to_string());
            optimizations.push("Add proper dependency array to useEffect".to_string());
        }

        if self.state_calls.find_iter(code).count() > 5 {
            issues.push("Excessive state management may impact performance".to_string());
            optimizations.push("Consider consolidating state or using useReducer".to_string());
        }

        let score = (100_i64 - issues.len() as i64 * 10).max(0);

        Ok(json!({
            "issues": issues,
            "optimizations": optimizations,
            "score": score,
        }))
    }
}

fn complexity_patterns() -> Result<Vec<Regex>, EngineError> {
    [
        r"\bif\b", r"\belse\b", r"\bfor\b", r"\bwhile\b", r"\bcase\b", r"\bcatch\b",
        r"\b&&\b", r"\b\|\|\b", r"\b\?\b",
    ]
    .iter()
    .map(|p| Regex::new(p).map_err(|e| EngineError::Plugin(format!("invalid pattern: {}", e))))
    .collect()
}

fn count_complexity(patterns: &[Regex], code: &str) -> usize {
    1 + patterns.iter().map(|p| p.find_iter(code).count()).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_code_analysis_output_shape() {
        let plugin = CodeAnalysisPlugin::new().unwrap();
        let result = plugin
            .execute(json!({
                "code": "// entry\nif (x) { console.log(x); }\n",
                "language": "javascript",
            }))
            .await
            .unwrap();

        assert!(result["quality"].as_i64().unwrap() < 100);
        assert_eq!(result["metrics"]["complexity"], json!(2));
        assert!(result["suggestions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s.as_str().unwrap().contains("console.log")));
    }

    #[tokio::test]
    async fn test_code_analysis_requires_code() {
        let plugin = CodeAnalysisPlugin::new().unwrap();
        let err = plugin.execute(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("missing 'code' parameter"));
    }

    #[tokio::test]
    async fn test_component_generator_substitutes_name() {
        let plugin = ComponentGeneratorPlugin;
        let result = plugin
            .execute(json!({
                "name": "PricingCard",
                "props": { "title": "string", "price": "number" },
            }))
            .await
            .unwrap();

        let component = result["component"].as_str().unwrap();
        assert!(component.contains("interface PricingCardProps"));
        assert!(component.contains("title: string;"));
        assert!(component.contains("price: number;"));
        assert_eq!(result["filename"], json!("PricingCard.tsx"));
        assert_eq!(result["type"], json!("react-component"));
    }

    #[tokio::test]
    async fn test_performance_analyzer_scores_issues() {
        let plugin = PerformanceAnalyzerPlugin::new().unwrap();
        let code = "for (const x of xs) { out.push(x); }\nconsole.log(out);";
        let result = plugin.execute(json!({ "code": code })).await.unwrap();

        assert_eq!(result["issues"].as_array().unwrap().len(), 2);
        assert_eq!(result["score"], json!(80));

        let clean = plugin.execute(json!({ "code": "const a = 1;" })).await.unwrap();
        assert_eq!(clean["issues"].as_array().unwrap().len(), 0);
        assert_eq!(clean["score"], json!(100));
    }
}
