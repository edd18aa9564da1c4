//! Static checks on the build recipe before any engine is invoked.

use crate::RuntimeError;
use std::fs;
use std::path::Path;

/// Fixed location of the build recipe inside an artifact directory.
pub const RECIPE_FILE: &str = "Dockerfile";

const KNOWN_INSTRUCTIONS: &[&str] = &[
    "ADD",
    "ARG",
    "CMD",
    "COPY",
    "ENTRYPOINT",
    "ENV",
    "EXPOSE",
    "FROM",
    "HEALTHCHECK",
    "LABEL",
    "MAINTAINER",
    "ONBUILD",
    "RUN",
    "SHELL",
    "STOPSIGNAL",
    "USER",
    "VOLUME",
    "WORKDIR",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// 1-based line where the instruction starts.
    pub line: usize,
    /// Upper-cased keyword.
    pub keyword: String,
    pub args: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub instructions: Vec<Instruction>,
}

impl Recipe {
    pub fn of_kind<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a Instruction> + 'a {
        self.instructions.iter().filter(move |i| i.keyword == keyword)
    }

    /// The effective start command: the last `ENTRYPOINT`, else the last `CMD`.
    pub fn start_command(&self) -> Option<&Instruction> {
        self.of_kind("ENTRYPOINT")
            .last()
            .or_else(|| self.of_kind("CMD").last())
    }

    /// Build-context sources referenced by `COPY`/`ADD` (excluding `--from` stages and URLs).
    pub fn context_sources(&self) -> Vec<&str> {
        let mut sources = Vec::new();
        for inst in self
            .instructions
            .iter()
            .filter(|i| i.keyword == "COPY" || i.keyword == "ADD")
        {
            if inst.args.contains("--from=") || inst.args.trim_start().starts_with('[') {
                continue;
            }
            let words: Vec<&str> = inst
                .args
                .split_whitespace()
                .filter(|w| !w.starts_with("--"))
                .collect();
            if let Some((_, srcs)) = words.split_last() {
                sources.extend(
                    srcs.iter()
                        .copied()
                        .filter(|s| !s.contains("://")),
                );
            }
        }
        sources
    }
}

pub fn parse_recipe(content: &str) -> Result<Recipe, RuntimeError> {
    let mut instructions = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if pending.is_none() && (trimmed.is_empty() || trimmed.starts_with('#')) {
            continue;
        }
        let (start, mut text) = pending.take().unwrap_or((idx + 1, String::new()));
        if trimmed.starts_with('#') {
            // comment inside a continuation
            pending = Some((start, text));
            continue;
        }
        if let Some(body) = trimmed.strip_suffix('\\') {
            text.push_str(body);
            text.push(' ');
            pending = Some((start, text));
            continue;
        }
        text.push_str(trimmed);
        instructions.push(split_instruction(start, &text)?);
    }
    if let Some((start, text)) = pending {
        if !text.trim().is_empty() {
            instructions.push(split_instruction(start, &text)?);
        }
    }

    let first = instructions
        .iter()
        .find(|i| i.keyword != "ARG")
        .ok_or_else(|| RuntimeError::RecipeInvalid("recipe has no instructions".to_owned()))?;
    if first.keyword != "FROM" {
        return Err(RuntimeError::RecipeInvalid(format!(
            "line {}: first instruction must be FROM, found {}",
            first.line, first.keyword
        )));
    }

    Ok(Recipe { instructions })
}

fn split_instruction(line: usize, text: &str) -> Result<Instruction, RuntimeError> {
    let text = text.trim();
    let (word, args) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let keyword = word.to_ascii_uppercase();
    if !KNOWN_INSTRUCTIONS.contains(&keyword.as_str()) {
        return Err(RuntimeError::RecipeInvalid(format!(
            "line {line}: unknown instruction '{word}'"
        )));
    }
    Ok(Instruction {
        line,
        keyword,
        args: args.trim().to_owned(),
    })
}

/// Read and check the recipe in `dir`.
pub fn load_recipe(dir: &Path) -> Result<Recipe, RuntimeError> {
    let path = dir.join(RECIPE_FILE);
    if !path.is_file() {
        return Err(RuntimeError::RecipeMissing(path));
    }
    parse_recipe(&fs::read_to_string(&path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typical_recipe() {
        let recipe = parse_recipe(
            "# syntax=docker/dockerfile:1\nARG BASE=python:3.11\nFROM ${BASE}\n\nCOPY . /workspace\nWORKDIR /workspace\nRUN pip install -r requirements.txt \\\n    && echo done\nENTRYPOINT [\"python\", \"-m\", \"mwu_encoder\"]\n",
        )
        .unwrap();
        assert_eq!(recipe.instructions.len(), 6);
        assert_eq!(recipe.instructions[2].keyword, "COPY");
        let run = recipe.of_kind("RUN").next().unwrap();
        assert_eq!(run.line, 7);
        assert!(run.args.contains("echo done"));
        assert_eq!(recipe.start_command().unwrap().keyword, "ENTRYPOINT");
    }

    #[test]
    fn rejects_unknown_instruction() {
        let err = parse_recipe("FROM alpine\nRUNN echo hi\n").unwrap_err();
        assert!(matches!(err, RuntimeError::RecipeInvalid(ref m) if m.contains("RUNN")));
    }

    #[test]
    fn rejects_missing_from() {
        assert!(parse_recipe("RUN echo hi\n").is_err());
        assert!(parse_recipe("# only a comment\n\n").is_err());
    }

    #[test]
    fn lowercase_keywords_are_accepted() {
        let recipe = parse_recipe("from alpine\ncmd [\"sh\"]\n").unwrap();
        assert_eq!(recipe.instructions[0].keyword, "FROM");
    }

    #[test]
    fn context_sources_skip_stages_and_flags() {
        let recipe = parse_recipe(
            "FROM alpine AS build\nFROM alpine\nCOPY --chown=1 a.py b.py /app/\nCOPY --from=build /out /out\nADD https://example.com/x.tar /x\n",
        )
        .unwrap();
        assert_eq!(recipe.context_sources(), vec!["a.py", "b.py"]);
    }

    #[test]
    fn missing_recipe_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_recipe(dir.path()),
            Err(RuntimeError::RecipeMissing(_))
        ));
    }
}
