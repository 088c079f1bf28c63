//! Permission requirement expressions.
//!
//! Platform methods can demand a single permission, all of a set, any of a
//! set, exactly one of two, or an arbitrary nesting of those. Requirements can
//! also be limited to a range of API levels (`apis = "..22"`) or marked
//! conditional, in which case the platform only sometimes enforces them.

use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Platform permissions the user can revoke at runtime (dangerous protection level)
pub const REVOCABLE_PERMISSIONS: &[&str] = &[
    "android.permission.ACCESS_COARSE_LOCATION",
    "android.permission.ACCESS_FINE_LOCATION",
    "android.permission.BODY_SENSORS",
    "android.permission.CALL_PHONE",
    "android.permission.CAMERA",
    "android.permission.GET_ACCOUNTS",
    "android.permission.PROCESS_OUTGOING_CALLS",
    "android.permission.READ_CALENDAR",
    "android.permission.READ_CALL_LOG",
    "android.permission.READ_CELL_BROADCASTS",
    "android.permission.READ_CONTACTS",
    "android.permission.READ_EXTERNAL_STORAGE",
    "android.permission.READ_PHONE_STATE",
    "android.permission.READ_PROFILE",
    "android.permission.READ_SMS",
    "android.permission.READ_SOCIAL_STREAM",
    "android.permission.RECEIVE_MMS",
    "android.permission.RECEIVE_SMS",
    "android.permission.RECEIVE_WAP_PUSH",
    "android.permission.RECORD_AUDIO",
    "android.permission.SEND_SMS",
    "android.permission.USE_SIP",
    "android.permission.WRITE_CALENDAR",
    "android.permission.WRITE_CALL_LOG",
    "android.permission.WRITE_CONTACTS",
    "android.permission.WRITE_EXTERNAL_STORAGE",
    "android.permission.WRITE_PROFILE",
    "android.permission.WRITE_SOCIAL_STREAM",
    "com.android.voicemail.permission.ADD_VOICEMAIL",
];

pub fn is_revocable_permission(name: &str) -> bool {
    REVOCABLE_PERMISSIONS.contains(&name)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionParseError {
    #[error("empty permission expression")]
    Empty,
    #[error("unexpected token `{token}` in permission expression `{input}`")]
    UnexpectedToken { token: String, input: String },
    #[error("unbalanced parentheses in permission expression `{0}`")]
    Unbalanced(String),
    #[error("invalid API range `{0}`")]
    InvalidRange(String),
}

/// Boolean combination of permission names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermissionExpr {
    Single(String),
    AllOf(Vec<PermissionExpr>),
    AnyOf(Vec<PermissionExpr>),
    /// Exactly one of the two; holding both is a failure
    Xor(Box<PermissionExpr>, Box<PermissionExpr>),
    /// Only sometimes enforced; never a hard failure
    Conditional(Box<PermissionExpr>),
}

impl PermissionExpr {
    pub fn single(name: impl Into<String>) -> Self {
        PermissionExpr::Single(name.into())
    }

    pub fn all_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PermissionExpr::AllOf(names.into_iter().map(Self::single).collect())
    }

    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PermissionExpr::AnyOf(names.into_iter().map(Self::single).collect())
    }

    pub fn xor(a: PermissionExpr, b: PermissionExpr) -> Self {
        PermissionExpr::Xor(Box::new(a), Box::new(b))
    }

    /// Whether the requirement holds given the permissions declared by the
    /// module and those guaranteed by guards at the call site
    pub fn is_satisfied(&self, held: &BTreeSet<String>, guaranteed: &BTreeSet<String>) -> bool {
        match self {
            PermissionExpr::Single(name) => held.contains(name) || guaranteed.contains(name),
            PermissionExpr::AllOf(children) => {
                children.iter().all(|c| c.is_satisfied(held, guaranteed))
            }
            PermissionExpr::AnyOf(children) => {
                children.iter().any(|c| c.is_satisfied(held, guaranteed))
            }
            PermissionExpr::Xor(a, b) => {
                a.is_satisfied(held, guaranteed) != b.is_satisfied(held, guaranteed)
            }
            PermissionExpr::Conditional(_) => true,
        }
    }

    /// The inner expression of a conditional requirement
    pub fn conditional_inner(&self) -> Option<&PermissionExpr> {
        match self {
            PermissionExpr::Conditional(inner) => Some(inner),
            _ => None,
        }
    }

    /// Human readable form of the unsatisfied part, listing only what is missing
    pub fn describe_missing(&self, held: &BTreeSet<String>, guaranteed: &BTreeSet<String>) -> String {
        match self {
            PermissionExpr::Single(name) => name.clone(),
            PermissionExpr::AllOf(children) => children
                .iter()
                .filter(|c| !c.is_satisfied(held, guaranteed))
                .map(|c| c.describe_nested(|e| e.describe_missing(held, guaranteed)))
                .collect::<Vec<_>>()
                .join(" and "),
            PermissionExpr::AnyOf(_) | PermissionExpr::Xor(..) => self.to_string(),
            PermissionExpr::Conditional(inner) => inner.describe_missing(held, guaranteed),
        }
    }

    fn describe_nested(&self, describe: impl Fn(&PermissionExpr) -> String) -> String {
        let text = describe(self);
        if self.is_compound() {
            format!("({})", text)
        } else {
            text
        }
    }

    fn is_compound(&self) -> bool {
        match self {
            PermissionExpr::Single(_) => false,
            PermissionExpr::AllOf(c) | PermissionExpr::AnyOf(c) => c.len() > 1,
            PermissionExpr::Xor(..) => true,
            PermissionExpr::Conditional(inner) => inner.is_compound(),
        }
    }

    /// Names of the permissions whose absence makes the expression unsatisfied
    pub fn missing_permissions(
        &self,
        held: &BTreeSet<String>,
        guaranteed: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        let mut missing = BTreeSet::new();
        self.collect_missing(held, guaranteed, &mut missing);
        missing
    }

    fn collect_missing(
        &self,
        held: &BTreeSet<String>,
        guaranteed: &BTreeSet<String>,
        out: &mut BTreeSet<String>,
    ) {
        if self.is_satisfied(held, guaranteed) && self.conditional_inner().is_none() {
            return;
        }
        match self {
            PermissionExpr::Single(name) => {
                if !held.contains(name) && !guaranteed.contains(name) {
                    out.insert(name.clone());
                }
            }
            PermissionExpr::AllOf(children) | PermissionExpr::AnyOf(children) => {
                for child in children {
                    child.collect_missing(held, guaranteed, out);
                }
            }
            PermissionExpr::Xor(a, b) => {
                a.collect_missing(held, guaranteed, out);
                b.collect_missing(held, guaranteed, out);
            }
            PermissionExpr::Conditional(inner) => inner.collect_missing(held, guaranteed, out),
        }
    }

    /// Every permission name mentioned in the expression
    pub fn permissions(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, out: &mut BTreeSet<String>) {
        match self {
            PermissionExpr::Single(name) => {
                out.insert(name.clone());
            }
            PermissionExpr::AllOf(children) | PermissionExpr::AnyOf(children) => {
                for child in children {
                    child.collect_names(out);
                }
            }
            PermissionExpr::Xor(a, b) => {
                a.collect_names(out);
                b.collect_names(out);
            }
            PermissionExpr::Conditional(inner) => inner.collect_names(out),
        }
    }

    /// Permissions that are certainly held whenever this expression is satisfied.
    /// A caller annotated with the expression can rely on them.
    pub fn implied_held(&self) -> BTreeSet<String> {
        match self {
            PermissionExpr::Single(name) => BTreeSet::from([name.clone()]),
            PermissionExpr::AllOf(children) => {
                children.iter().flat_map(|c| c.implied_held()).collect()
            }
            PermissionExpr::AnyOf(children) => {
                let mut sets = children.iter().map(|c| c.implied_held());
                let first = sets.next().unwrap_or_default();
                sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect())
            }
            PermissionExpr::Xor(..) | PermissionExpr::Conditional(_) => BTreeSet::new(),
        }
    }

    /// Permissions in the expression that the user may revoke at runtime
    pub fn revocable_permissions(&self, custom: &BTreeSet<String>) -> BTreeSet<String> {
        self.permissions()
            .into_iter()
            .filter(|p| is_revocable_permission(p) || custom.contains(p))
            .collect()
    }

    pub fn is_revocable(&self, custom: &BTreeSet<String>) -> bool {
        !self.revocable_permissions(custom).is_empty()
    }

    /// Parse an annotation-style expression: `(A || B) && (C ^ D)`
    pub fn parse(input: &str) -> Result<Self, PermissionParseError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(PermissionParseError::Empty);
        }
        let mut parser = ExprParser {
            tokens: &tokens,
            pos: 0,
            input,
        };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(")") => Err(PermissionParseError::Unbalanced(input.to_string())),
            Some(token) => Err(PermissionParseError::UnexpectedToken {
                token: token.to_string(),
                input: input.to_string(),
            }),
        }
    }
}

impl fmt::Display for PermissionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nested = |e: &PermissionExpr| e.describe_nested(|e| e.to_string());
        match self {
            PermissionExpr::Single(name) => write!(f, "{}", name),
            PermissionExpr::AllOf(children) => {
                let parts: Vec<_> = children.iter().map(nested).collect();
                write!(f, "{}", parts.join(" and "))
            }
            PermissionExpr::AnyOf(children) => {
                let parts: Vec<_> = children.iter().map(nested).collect();
                write!(f, "{}", parts.join(" or "))
            }
            PermissionExpr::Xor(a, b) => write!(f, "{} xor {}", nested(a.as_ref()), nested(b.as_ref())),
            PermissionExpr::Conditional(inner) => write!(f, "{}", inner),
        }
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\|\||&&|\^|\(|\)|[A-Za-z_][A-Za-z0-9_.]*)")
            .expect("permission token pattern is valid")
    })
}

fn tokenize(input: &str) -> Result<Vec<&str>, PermissionParseError> {
    let mut tokens = Vec::new();
    let mut rest = input;
    while !rest.trim().is_empty() {
        let Some(caps) = token_pattern().captures(rest) else {
            return Err(PermissionParseError::UnexpectedToken {
                token: rest.trim().chars().take(8).collect(),
                input: input.to_string(),
            });
        };
        let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        tokens.push(token.as_str());
        rest = &rest[whole.end()..];
    }
    Ok(tokens)
}

struct ExprParser<'t> {
    tokens: &'t [&'t str],
    pos: usize,
    input: &'t str,
}

impl<'t> ExprParser<'t> {
    fn peek(&self) -> Option<&'t str> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&'t str> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<PermissionExpr, PermissionParseError> {
        let mut children = vec![self.parse_and()?];
        while self.peek() == Some("||") {
            self.next();
            children.push(self.parse_and()?);
        }
        Ok(flatten(children, PermissionExpr::AnyOf))
    }

    fn parse_and(&mut self) -> Result<PermissionExpr, PermissionParseError> {
        let mut children = vec![self.parse_xor()?];
        while self.peek() == Some("&&") {
            self.next();
            children.push(self.parse_xor()?);
        }
        Ok(flatten(children, PermissionExpr::AllOf))
    }

    fn parse_xor(&mut self) -> Result<PermissionExpr, PermissionParseError> {
        let mut expr = self.parse_primary()?;
        while self.peek() == Some("^") {
            self.next();
            let rhs = self.parse_primary()?;
            expr = PermissionExpr::xor(expr, rhs);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<PermissionExpr, PermissionParseError> {
        match self.next() {
            Some("(") => {
                let inner = self.parse_or()?;
                if self.next() != Some(")") {
                    return Err(PermissionParseError::Unbalanced(self.input.to_string()));
                }
                Ok(inner)
            }
            Some(token) if !matches!(token, ")" | "||" | "&&" | "^") => {
                Ok(PermissionExpr::single(token))
            }
            Some(token) => Err(PermissionParseError::UnexpectedToken {
                token: token.to_string(),
                input: self.input.to_string(),
            }),
            None => Err(PermissionParseError::UnexpectedToken {
                token: "<end>".to_string(),
                input: self.input.to_string(),
            }),
        }
    }
}

fn flatten(
    mut children: Vec<PermissionExpr>,
    build: fn(Vec<PermissionExpr>) -> PermissionExpr,
) -> PermissionExpr {
    if children.len() == 1 {
        children.remove(0)
    } else {
        build(children)
    }
}

/// Inclusive range of API levels on which a requirement is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiRange {
    pub start: u32,
    pub end: u32,
}

impl ApiRange {
    pub fn all() -> Self {
        Self {
            start: 1,
            end: u32::MAX,
        }
    }

    /// Whether any level in `[min_sdk, target_sdk]` falls in the range
    pub fn overlaps(&self, min_sdk: u32, target_sdk: u32) -> bool {
        min_sdk <= self.end && target_sdk >= self.start
    }
}

impl FromStr for ApiRange {
    type Err = PermissionParseError;

    /// `"..22"`, `"23.."`, `"14..18"` or a single level `"23"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^\s*(\d+)?\s*(\.\.)?\s*(\d+)?\s*$").expect("range pattern is valid")
        });

        let invalid = || PermissionParseError::InvalidRange(s.to_string());
        let caps = pattern.captures(s).ok_or_else(invalid)?;
        let parse = |i: usize| -> Result<Option<u32>, PermissionParseError> {
            caps.get(i)
                .map(|m| m.as_str().parse().map_err(|_| invalid()))
                .transpose()
        };
        let start = parse(1)?;
        let end = parse(3)?;

        if caps.get(2).is_none() {
            // A single level
            let level = start.ok_or_else(invalid)?;
            return Ok(Self {
                start: level,
                end: level,
            });
        }

        Ok(Self {
            start: start.unwrap_or(1),
            end: end.unwrap_or(u32::MAX),
        })
    }
}

/// A permission expression attached to a platform symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionRequirement {
    pub expr: PermissionExpr,
    pub apis: Option<ApiRange>,
}

impl PermissionRequirement {
    pub fn new(expr: PermissionExpr) -> Self {
        Self { expr, apis: None }
    }

    pub fn with_apis(mut self, apis: ApiRange) -> Self {
        self.apis = Some(apis);
        self
    }

    pub fn conditional(self) -> Self {
        Self {
            expr: PermissionExpr::Conditional(Box::new(self.expr)),
            apis: self.apis,
        }
    }

    /// Whether the requirement is enforced for a module targeting this range
    pub fn applies_to(&self, min_sdk: u32, target_sdk: u32) -> bool {
        self.apis
            .map_or(true, |range| range.overlaps(min_sdk, target_sdk))
    }
}
