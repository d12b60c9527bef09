use crate::step::StepSpec;
use crate::CoreError;

/// Ordered list of step specifications.
///
/// Editing operations locate anchors by step name (first match) and never
/// run anything; [`Builder::build`] hands a frozen copy to the warden.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    stack: Vec<StepSpec>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: impl IntoIterator<Item = StepSpec>) -> Self {
        Self {
            stack: specs.into_iter().collect(),
        }
    }

    pub fn append(&mut self, spec: StepSpec) -> &mut Self {
        self.stack.push(spec);
        self
    }

    /// Append every step of another builder.
    pub fn use_builder(&mut self, other: &Builder) -> &mut Self {
        self.stack.extend(other.stack.iter().cloned());
        self
    }

    pub fn insert(&mut self, index: usize, spec: StepSpec) -> Result<&mut Self, CoreError> {
        if index > self.stack.len() {
            return Err(CoreError::IndexOutOfRange {
                index,
                len: self.stack.len(),
            });
        }
        self.stack.insert(index, spec);
        Ok(self)
    }

    pub fn insert_before(&mut self, anchor: &str, spec: StepSpec) -> Result<&mut Self, CoreError> {
        let idx = self.require(anchor)?;
        self.stack.insert(idx, spec);
        Ok(self)
    }

    pub fn insert_after(&mut self, anchor: &str, spec: StepSpec) -> Result<&mut Self, CoreError> {
        let idx = self.require(anchor)?;
        self.stack.insert(idx + 1, spec);
        Ok(self)
    }

    pub fn replace(&mut self, anchor: &str, spec: StepSpec) -> Result<&mut Self, CoreError> {
        let idx = self.require(anchor)?;
        self.stack[idx] = spec;
        Ok(self)
    }

    pub fn delete(&mut self, anchor: &str) -> Result<&mut Self, CoreError> {
        let idx = self.require(anchor)?;
        self.stack.remove(idx);
        Ok(self)
    }

    /// Position of the first step named `anchor`.
    pub fn index(&self, anchor: &str) -> Option<usize> {
        self.stack.iter().position(|s| s.name() == anchor)
    }

    fn require(&self, anchor: &str) -> Result<usize, CoreError> {
        self.index(anchor)
            .ok_or_else(|| CoreError::StepNotFound(anchor.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stack.iter().map(StepSpec::name).collect()
    }

    pub fn specs(&self) -> &[StepSpec] {
        &self.stack
    }

    pub fn build(&self) -> Vec<StepSpec> {
        self.stack.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> StepSpec {
        StepSpec::from_fn(name, |_| Ok(()))
    }

    fn abc() -> Builder {
        Builder::from_specs([spec("A"), spec("B"), spec("C")])
    }

    #[test]
    fn insert_after_splices() {
        let mut b = abc();
        b.insert_after("B", spec("X")).unwrap();
        assert_eq!(b.names(), ["A", "B", "X", "C"]);
    }

    #[test]
    fn insert_before_splices() {
        let mut b = abc();
        b.insert_before("B", spec("X")).unwrap();
        assert_eq!(b.names(), ["A", "X", "B", "C"]);
    }

    #[test]
    fn replace_swaps_in_place() {
        let mut b = abc();
        b.replace("B", spec("X")).unwrap();
        assert_eq!(b.names(), ["A", "X", "C"]);
    }

    #[test]
    fn delete_removes() {
        let mut b = abc();
        b.delete("B").unwrap();
        assert_eq!(b.names(), ["A", "C"]);
    }

    #[test]
    fn missing_anchor_is_step_not_found() {
        let mut b = abc();
        for result in [
            b.clone().insert_after("Z", spec("X")).map(|_| ()),
            b.clone().insert_before("Z", spec("X")).map(|_| ()),
            b.clone().replace("Z", spec("X")).map(|_| ()),
            b.delete("Z").map(|_| ()),
        ] {
            assert!(matches!(result, Err(CoreError::StepNotFound(ref n)) if n == "Z"));
        }
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn anchors_match_first_occurrence() {
        let mut b = Builder::from_specs([spec("A"), spec("B"), spec("A")]);
        b.insert_after("A", spec("X")).unwrap();
        assert_eq!(b.names(), ["A", "X", "B", "A"]);
    }

    #[test]
    fn insert_at_index() {
        let mut b = abc();
        b.insert(0, spec("X")).unwrap();
        b.insert(4, spec("Y")).unwrap();
        assert_eq!(b.names(), ["X", "A", "B", "C", "Y"]);
        assert!(matches!(
            b.insert(9, spec("Z")),
            Err(CoreError::IndexOutOfRange { index: 9, len: 5 })
        ));
    }

    #[test]
    fn use_builder_appends_and_copies() {
        let mut b = abc();
        let copy = b.clone();
        b.use_builder(&Builder::from_specs([spec("D")]));
        assert_eq!(b.names(), ["A", "B", "C", "D"]);
        assert_eq!(copy.names(), ["A", "B", "C"]);
    }

    #[test]
    fn chained_appends() {
        let mut b = Builder::new();
        b.append(spec("A")).append(spec("B"));
        assert_eq!(b.index("B"), Some(1));
        assert!(b.index("Q").is_none());
        assert_eq!(b.build().len(), 2);
    }
}
