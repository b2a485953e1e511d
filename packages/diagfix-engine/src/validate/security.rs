//! Denylist scan over inserted text

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityRisk {
    DynamicCodeExecution,
    HtmlInjection,
    HardcodedSecret,
    ShellExecution,
}

impl SecurityRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityRisk::DynamicCodeExecution => "dynamic_code_execution",
            SecurityRisk::HtmlInjection => "html_injection",
            SecurityRisk::HardcodedSecret => "hardcoded_secret",
            SecurityRisk::ShellExecution => "shell_execution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFlag {
    pub risk: SecurityRisk,
    pub rule: String,
    /// The offending line of inserted text, trimmed
    pub excerpt: String,
}

struct DenyRule {
    name: &'static str,
    risk: SecurityRisk,
    pattern: Regex,
}

lazy_static! {
    static ref DENYLIST: Vec<DenyRule> = {
        use SecurityRisk::*;
        let rules: &[(&'static str, SecurityRisk, &str)] = &[
            ("eval", DynamicCodeExecution, r"\beval\s*\("),
            ("function_constructor", DynamicCodeExecution, r"\bnew\s+Function\s*\("),
            ("string_timer", DynamicCodeExecution, r#"\bset(Timeout|Interval)\s*\(\s*['"`]"#),
            ("python_exec", DynamicCodeExecution, r"(^|[^.\w])exec\s*\(\s*['\x22]"),
            ("inner_html", HtmlInjection, r"\.(inner|outer)HTML\s*\+?="),
            ("dangerously_set_inner_html", HtmlInjection, r"dangerouslySetInnerHTML"),
            ("document_write", HtmlInjection, r"\bdocument\.write(ln)?\s*\("),
            ("insert_adjacent_html", HtmlInjection, r"\.insertAdjacentHTML\s*\("),
            (
                "secret_assignment",
                HardcodedSecret,
                r#"(?i)\b(api[_-]?key|secret|passw(or)?d|access[_-]?token|auth[_-]?token)\b['"]?\s*[:=]\s*['"][^'"\s]{8,}['"]"#,
            ),
            ("aws_access_key", HardcodedSecret, r"\bAKIA[0-9A-Z]{16}\b"),
            ("private_key_block", HardcodedSecret, r"-----BEGIN ([A-Z]+ )?PRIVATE KEY-----"),
            ("openai_key", HardcodedSecret, r"\bsk-[A-Za-z0-9_-]{20,}"),
            ("github_token", HardcodedSecret, r"\bgh[pousr]_[A-Za-z0-9]{36}\b"),
            ("child_process", ShellExecution, r#"\brequire\s*\(\s*['"]child_process['"]\s*\)|from\s+['"](node:)?child_process['"]"#),
            ("exec_sync", ShellExecution, r"\b(execSync|spawnSync|execFileSync)\s*\("),
            ("os_system", ShellExecution, r"\bos\.(system|popen)\s*\("),
            ("subprocess_shell", ShellExecution, r"\bsubprocess\.\w+\s*\(.*shell\s*=\s*True"),
            ("rust_command", ShellExecution, r"\b(std::)?process::Command::new\s*\("),
            ("go_exec", ShellExecution, r"\bexec\.Command\s*\("),
        ];
        rules
            .iter()
            .filter_map(|&(name, risk, pattern)| {
                Regex::new(pattern).ok().map(|pattern| DenyRule {
                    name,
                    risk,
                    pattern,
                })
            })
            .collect()
    };
}

/// Every denylist hit in `text`, one flag per (rule, line)
pub fn scan(text: &str) -> Vec<SecurityFlag> {
    let mut flags = Vec::new();
    for line in text.lines() {
        for rule in DENYLIST.iter() {
            if rule.pattern.is_match(line) {
                flags.push(SecurityFlag {
                    risk: rule.risk,
                    rule: rule.name.to_string(),
                    excerpt: line.trim().to_string(),
                });
            }
        }
    }
    flags
}
