use crate::builder::Builder;
use crate::step::StepSpec;
use crate::CoreError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Pipeline edits a plugin wants applied to an action.
#[derive(Debug, Clone, Default)]
pub struct Hook {
    before: Vec<(String, Vec<StepSpec>)>,
    after: Vec<(String, Vec<StepSpec>)>,
    prepend: Vec<StepSpec>,
    append: Vec<StepSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Only apply before/after edits.
    pub no_prepend_or_append: bool,
    /// Prepend/append around this step instead of the whole builder.
    pub root: Option<String>,
}

impl ApplyOptions {
    /// Options used for builders produced by branch continuations.
    pub fn nested() -> Self {
        Self {
            no_prepend_or_append: true,
            root: None,
        }
    }
}

fn push_keyed(list: &mut Vec<(String, Vec<StepSpec>)>, anchor: &str, spec: StepSpec) {
    match list.iter_mut().find(|(k, _)| k == anchor) {
        Some((_, specs)) => specs.push(spec),
        None => list.push((anchor.to_owned(), vec![spec])),
    }
}

impl Hook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(&mut self, anchor: &str, spec: StepSpec) -> &mut Self {
        push_keyed(&mut self.before, anchor, spec);
        self
    }

    pub fn after(&mut self, anchor: &str, spec: StepSpec) -> &mut Self {
        push_keyed(&mut self.after, anchor, spec);
        self
    }

    pub fn prepend(&mut self, spec: StepSpec) -> &mut Self {
        self.prepend.push(spec);
        self
    }

    pub fn append(&mut self, spec: StepSpec) -> &mut Self {
        self.append.push(spec);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty()
            && self.after.is_empty()
            && self.prepend.is_empty()
            && self.append.is_empty()
    }

    /// Apply the recorded edits. Prepends and appends keep their recorded
    /// order; before/after edits for anchors absent from `builder` are
    /// skipped.
    pub fn apply(&self, builder: &mut Builder, options: &ApplyOptions) -> Result<(), CoreError> {
        if !options.no_prepend_or_append {
            let (start, end) = match &options.root {
                Some(root) => {
                    let idx = builder
                        .index(root)
                        .ok_or_else(|| CoreError::StepNotFound(root.clone()))?;
                    (idx, Some(idx))
                }
                None => (0, None),
            };
            for (i, spec) in self.prepend.iter().enumerate() {
                builder.insert(start + i, spec.clone())?;
            }
            let mut tail = end.map(|idx| idx + self.prepend.len() + 1);
            for spec in &self.append {
                match tail.as_mut() {
                    Some(pos) => {
                        builder.insert(*pos, spec.clone())?;
                        *pos += 1;
                    }
                    None => {
                        builder.append(spec.clone());
                    }
                }
            }
        }

        for (anchor, specs) in &self.before {
            if builder.index(anchor).is_none() {
                continue;
            }
            for spec in specs {
                builder.insert_before(anchor, spec.clone())?;
            }
        }

        for (anchor, specs) in &self.after {
            let Some(idx) = builder.index(anchor) else {
                continue;
            };
            for (i, spec) in specs.iter().enumerate() {
                builder.insert(idx + 1 + i, spec.clone())?;
            }
        }
        Ok(())
    }
}

type HookFn = Arc<dyn Fn(&mut Hook) + Send + Sync>;

/// Hook callbacks registered by plugins, keyed by action name.
#[derive(Clone, Default)]
pub struct HookSet {
    by_action: HashMap<String, Vec<HookFn>>,
    all: Vec<HookFn>,
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.by_action.keys().collect();
        actions.sort_unstable();
        f.debug_struct("HookSet")
            .field("actions", &actions)
            .field("all", &self.all.len())
            .finish()
    }
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, action: impl Into<String>, hook: F)
    where
        F: Fn(&mut Hook) + Send + Sync + 'static,
    {
        self.by_action
            .entry(action.into())
            .or_default()
            .push(Arc::new(hook));
    }

    /// Register a hook for every action.
    pub fn register_all<F>(&mut self, hook: F)
    where
        F: Fn(&mut Hook) + Send + Sync + 'static,
    {
        self.all.push(Arc::new(hook));
    }

    /// Build the combined hook for an action: hooks for every action first,
    /// then hooks keyed by any form of the action name.
    pub fn hook_for(&self, action: &str) -> Hook {
        let mut hook = Hook::new();
        for f in &self.all {
            f(&mut hook);
        }
        for key in hook_keys(action) {
            if let Some(fns) = self.by_action.get(&key) {
                debug!("applying {} hook(s) registered for '{key}'", fns.len());
                for f in fns {
                    f(&mut hook);
                }
            }
        }
        hook
    }
}

/// Every name a hook may be registered under for `action`: the full path,
/// each shorter `::` suffix, and the snake_case form of each.
pub fn hook_keys(action: &str) -> Vec<String> {
    let segments: Vec<&str> = action.split("::").collect();
    let mut keys = Vec::new();
    for start in 0..segments.len() {
        let suffix = &segments[start..];
        let plain = suffix.join("::");
        let snake = suffix
            .iter()
            .map(|s| snake_case(s))
            .collect::<Vec<_>>()
            .join("::");
        for key in [plain, snake] {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

fn snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if i > 0 && (prev_lower || (next_lower && chars[i - 1].is_uppercase())) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    out
}
