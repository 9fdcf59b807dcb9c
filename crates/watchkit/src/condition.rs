use regex::Regex;

/// Comparator applied by a condition rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    /// Interval form `(a,b)`: matches when a < value < b.
    Within,
    /// Regex match against the string form of the value.
    Matches,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "=~" => Some(Self::Matches),
            _ => None,
        }
    }
}

/// One rule out of an ordered list. Lists are walked top to bottom and the
/// first matching rule governs the cycle.
#[derive(Debug, Clone)]
pub struct Condition {
    pub value_1: f64,
    pub value_2: f64,
    pub string_value: String,
    pub operation: Operator,
    /// Command to hand to the executor when the rule matches.
    pub command: Option<String>,
    pattern: Option<Regex>,
}

/// A matched rule's command, described for an external executor. The rule
/// engine never runs commands itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredAction {
    pub module: String,
    pub command: String,
}

fn split_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => Some((head, tail.trim())),
        None => Some((s, "")),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl Condition {
    /// Parse one rule line: `(a,b) [command]`, `<op> <number> [command]` or
    /// `=~ <pattern> [command]`. Returns None for anything malformed.
    pub fn parse(line: &str) -> Option<Self> {
        let (first, rest) = split_token(line)?;

        if let Some(body) = first.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            let (a, b) = body.split_once(',')?;
            return Some(Self {
                value_1: a.trim().parse().ok()?,
                value_2: b.trim().parse().ok()?,
                string_value: String::new(),
                operation: Operator::Within,
                command: non_empty(rest),
                pattern: None,
            });
        }

        let operation = Operator::parse(first)?;
        let (operand, command) = split_token(rest)?;

        if operation == Operator::Matches {
            return Some(Self {
                value_1: 0.0,
                value_2: 0.0,
                string_value: operand.to_string(),
                operation,
                command: non_empty(command),
                pattern: Some(Regex::new(operand).ok()?),
            });
        }

        Some(Self {
            value_1: operand.parse().ok()?,
            value_2: 0.0,
            string_value: String::new(),
            operation,
            command: non_empty(command),
            pattern: None,
        })
    }

    /// Test this rule against a produced value. The numeric side is used for
    /// comparison operators, the string side for pattern rules.
    pub fn matches(&self, string_value: &str, numeric: Option<f64>) -> bool {
        if self.operation == Operator::Matches {
            return self.pattern.as_ref().is_some_and(|re| re.is_match(string_value));
        }
        let Some(v) = numeric else { return false };
        match self.operation {
            Operator::Gt => v > self.value_1,
            Operator::Lt => v < self.value_1,
            Operator::Ge => v >= self.value_1,
            Operator::Le => v <= self.value_1,
            Operator::Eq => v == self.value_1,
            Operator::Ne => v != self.value_1,
            Operator::Within => v > self.value_1 && v < self.value_2,
            Operator::Matches => false,
        }
    }
}

/// Walk an ordered rule list; the index of the first match governs, the rest
/// are not evaluated.
pub fn first_match(rules: &[Condition], string_value: &str, numeric: Option<f64>) -> Option<usize> {
    rules.iter().position(|rule| rule.matches(string_value, numeric))
}
