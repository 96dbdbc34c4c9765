use std::fmt;
use std::str::FromStr;

use crate::db::statements::{StatementSet, POSTGRES};
use crate::error::ProvisionError;
use crate::models::ValueSet;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Placeholder(String),
}

/// A parsed statement with `{name}` placeholders. `{{` and `}}` are literal
/// braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(name: &str, text: &str) -> Result<Self, ProvisionError> {
        let fail = |reason: String| ProvisionError::TemplateParse {
            template: name.to_owned(),
            reason,
        };

        if text.trim().is_empty() {
            return Err(fail("empty statement".into()));
        }

        let mut segments = Vec::new();
        let mut text_buf = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    text_buf.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    text_buf.push('}');
                }
                '}' => return Err(fail(format!("unmatched '}}' at byte {pos}"))),
                '{' => {
                    let mut placeholder = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, c)) if c.is_ascii_lowercase() || c == '_' => placeholder.push(c),
                            Some((_, c)) if c.is_ascii_digit() && !placeholder.is_empty() => {
                                placeholder.push(c)
                            }
                            Some((at, c)) => {
                                return Err(fail(format!("invalid character {c:?} in placeholder at byte {at}")))
                            }
                            None => return Err(fail(format!("unterminated placeholder at byte {pos}"))),
                        }
                    }
                    if placeholder.is_empty() {
                        return Err(fail(format!("empty placeholder at byte {pos}")));
                    }
                    if !text_buf.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text_buf)));
                    }
                    segments.push(Segment::Placeholder(placeholder));
                }
                c => text_buf.push(c),
            }
        }
        if !text_buf.is_empty() {
            segments.push(Segment::Text(text_buf));
        }

        Ok(Self {
            name: name.to_owned(),
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p.as_str()),
            Segment::Text(_) => None,
        })
    }

    /// Render against `values`. A placeholder with no value is an error,
    /// never an empty substitution.
    pub fn render(&self, values: &ValueSet) -> Result<String, ProvisionError> {
        let mut sql = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => sql.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values.get(name).ok_or_else(|| ProvisionError::TemplateRender {
                        template: self.name.clone(),
                        placeholder: name.clone(),
                    })?;
                    sql.push_str(&value.render());
                }
            }
        }
        Ok(sql)
    }
}

/// The four statement groups a registry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementGroup {
    Forward,
    Backward,
    Bootstrap,
    PostCreate,
}

impl StatementGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Bootstrap => "bootstrap",
            Self::PostCreate => "postCreate",
        }
    }
}

impl fmt::Display for StatementGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementGroup {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            "bootstrap" => Ok(Self::Bootstrap),
            "postCreate" => Ok(Self::PostCreate),
            other => Err(ProvisionError::UnknownGroup(other.to_owned())),
        }
    }
}

/// Parsed templates for every group, built once and shared read-only.
/// `backward[i]` is the compensation for `forward[i]`.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    forward: Vec<Template>,
    backward: Vec<Template>,
    bootstrap: Vec<Template>,
    post_create: Vec<Template>,
}

impl TemplateRegistry {
    pub fn new(set: &StatementSet) -> Result<Self, ProvisionError> {
        let mut forward = Vec::with_capacity(set.steps.len());
        let mut backward = Vec::with_capacity(set.steps.len());
        for step in set.steps {
            forward.push(Template::parse(step.name, step.forward)?);
            backward.push(Template::parse(&format!("undo_{}", step.name), step.backward)?);
        }

        let bootstrap = parse_group(set.bootstrap)?;
        let post_create = parse_group(set.post_create)?;

        Self::from_parts(forward, backward, bootstrap, post_create)
    }

    /// Assemble a registry from already parsed templates. Forward and
    /// backward must pair up index for index.
    pub fn from_parts(
        forward: Vec<Template>,
        backward: Vec<Template>,
        bootstrap: Vec<Template>,
        post_create: Vec<Template>,
    ) -> Result<Self, ProvisionError> {
        if forward.len() != backward.len() {
            return Err(ProvisionError::StepCountMismatch {
                forward: forward.len(),
                backward: backward.len(),
            });
        }
        Ok(Self {
            forward,
            backward,
            bootstrap,
            post_create,
        })
    }

    /// The built-in PostgreSQL statement set.
    pub fn postgres() -> Result<Self, ProvisionError> {
        Self::new(&POSTGRES)
    }

    pub fn group(&self, group: StatementGroup) -> &[Template] {
        match group {
            StatementGroup::Forward => &self.forward,
            StatementGroup::Backward => &self.backward,
            StatementGroup::Bootstrap => &self.bootstrap,
            StatementGroup::PostCreate => &self.post_create,
        }
    }

    pub fn group_named(&self, name: &str) -> Result<&[Template], ProvisionError> {
        Ok(self.group(name.parse()?))
    }

    pub fn forward(&self) -> &[Template] {
        &self.forward
    }

    pub fn backward(&self) -> &[Template] {
        &self.backward
    }

    pub fn bootstrap(&self) -> &[Template] {
        &self.bootstrap
    }

    pub fn post_create(&self) -> &[Template] {
        &self.post_create
    }
}

fn parse_group(statements: &[(&str, &str)]) -> Result<Vec<Template>, ProvisionError> {
    statements
        .iter()
        .map(|(name, text)| Template::parse(name, text))
        .collect()
}
