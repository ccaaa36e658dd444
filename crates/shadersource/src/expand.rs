use crate::{LoadedSource, SourceError, SourceLoader, SourceParams};

/// Nesting limit for include chains.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Line-level directives understood by the expander.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    Include(&'a str),
}

impl<'a> Directive<'a> {
    /// Recognises `#include path` and `%include path`, with optional quotes or
    /// angle brackets around the path.
    pub fn parse(line: &'a str) -> Option<Self> {
        let trimmed = line.trim_start();
        let rest = trimmed
            .strip_prefix("#include ")
            .or_else(|| trimmed.strip_prefix("%include "))?;
        let path = rest
            .trim()
            .trim_matches(|ch| ch == '"' || ch == '<' || ch == '>')
            .trim();
        if path.is_empty() {
            None
        } else {
            Some(Directive::Include(path))
        }
    }
}

/// Replaces every `%KEY` token with its value.
///
/// Longer keys are substituted first so `%XY` survives a shorter `%X` key.
pub fn substitute(text: &str, params: &SourceParams) -> String {
    if params.is_empty() {
        return text.to_owned();
    }
    let mut keys: Vec<(&String, &String)> = params.iter().collect();
    keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut result = text.to_owned();
    for (key, value) in keys {
        let token = format!("%{key}");
        if result.contains(&token) {
            result = result.replace(&token, value);
        }
    }
    result
}

/// Expands `id` into a single source string.
///
/// Substitution applies to every file of the include tree. Directive lines are
/// recognised before substitution so a parameter can never turn ordinary text
/// into an include, nor break an existing one.
pub fn expand<L>(loader: &L, id: &str, params: &SourceParams) -> Result<String, SourceError>
where
    L: SourceLoader + ?Sized,
{
    let mut stack = Vec::new();
    expand_file(loader, id, None, params, &mut stack)
}

fn expand_file<L>(
    loader: &L,
    id: &str,
    parent: Option<&str>,
    params: &SourceParams,
    stack: &mut Vec<String>,
) -> Result<String, SourceError>
where
    L: SourceLoader + ?Sized,
{
    if stack.len() >= MAX_INCLUDE_DEPTH {
        return Err(SourceError::TooDeep {
            id: id.to_owned(),
            limit: MAX_INCLUDE_DEPTH,
        });
    }

    let LoadedSource { key, text } = loader.load(id, parent)?;
    if stack.contains(&key) {
        let mut chain = stack.clone();
        chain.push(key);
        return Err(SourceError::IncludeCycle(chain.join(" -> ")));
    }

    stack.push(key.clone());
    let mut lines = Vec::new();
    for line in text.lines() {
        match Directive::parse(line) {
            Some(Directive::Include(path)) => {
                let path = substitute(path, params);
                tracing::trace!(parent = %key, include = %path, "expanding include");
                lines.push(expand_file(loader, &path, Some(&key), params, stack)?);
            }
            None => lines.push(substitute(line, params)),
        }
    }
    stack.pop();

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{params, MemorySourceProvider, SourceProvider};

    #[test]
    fn parses_both_include_spellings() {
        assert_eq!(
            Directive::parse("#include common.glsl"),
            Some(Directive::Include("common.glsl"))
        );
        assert_eq!(
            Directive::parse("  %include \"lib/noise.glsl\""),
            Some(Directive::Include("lib/noise.glsl"))
        );
        assert_eq!(Directive::parse("// #include nope"), None);
        assert_eq!(Directive::parse("#include "), None);
    }

    #[test]
    fn substitutes_longest_key_first() {
        let values = params([("X", 1024), ("XY", 7)]);
        assert_eq!(substitute("a=%X b=%XY", &values), "a=1024 b=7");
    }

    #[test]
    fn expands_nested_includes_with_parameters() {
        let mut sources = MemorySourceProvider::new();
        sources.insert("main.glsl", "#include lib/a.glsl\nvoid main() { int w = %WIDTH; }");
        sources.insert("lib/a.glsl", "%include b.glsl\nconst int A = %WIDTH;");
        sources.insert("lib/b.glsl", "const int B = 2;");

        let text = sources
            .resolve("main.glsl", &params([("WIDTH", 64)]))
            .expect("expand");
        assert_eq!(
            text,
            "const int B = 2;\nconst int A = 64;\nvoid main() { int w = 64; }"
        );
    }

    #[test]
    fn reports_include_cycles() {
        let mut sources = MemorySourceProvider::new();
        sources.insert("a.glsl", "#include b.glsl");
        sources.insert("b.glsl", "#include a.glsl");

        let err = sources.resolve("a.glsl", &SourceParams::new()).unwrap_err();
        match err {
            SourceError::IncludeCycle(chain) => assert_eq!(chain, "a.glsl -> b.glsl -> a.glsl"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_include_names_the_file() {
        let mut sources = MemorySourceProvider::new();
        sources.insert("a.glsl", "#include gone.glsl");
        let err = sources.resolve("a.glsl", &SourceParams::new()).unwrap_err();
        assert!(err.to_string().contains("gone.glsl"));
    }
}
