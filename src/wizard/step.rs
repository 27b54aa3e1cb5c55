//! Step descriptors and the outcomes a step handler can produce.

/// What a step handler decided about one inbound answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The draft was updated; move to the next step.
    Proceed,
    /// The answer was rejected; ask the same step again after this message.
    Retry(String),
    /// Stop the flow and discard the draft, replying with this message.
    Abort(String),
}

/// Where a step's prompt gets its choice keyboard from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suggestions {
    None,
    /// Most common cities among stored profiles.
    TopCities,
}

/// Validates `text` and writes it into the draft.
///
/// `text` is already trimmed and is never the skip-token of a skippable step.
pub type StepHandler<D> = fn(text: &str, draft: &mut D) -> StepOutcome;

/// One question in a flow.
pub struct Step<D> {
    /// Name of the draft field this step owns.
    pub field: &'static str,
    pub prompt: &'static str,
    pub suggestions: Suggestions,
    /// Whether the skip-token leaves the field unset and moves on.
    pub skippable: bool,
    pub handler: StepHandler<D>,
}

impl<D> Step<D> {
    pub fn new(field: &'static str, prompt: &'static str, handler: StepHandler<D>) -> Self {
        Self {
            field,
            prompt,
            suggestions: Suggestions::None,
            skippable: true,
            handler,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Suggestions) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn required(mut self) -> Self {
        self.skippable = false;
        self
    }
}

/// Parse an integer answer within `min..=max`.
pub fn parse_bounded(text: &str, min: i64, max: i64) -> Option<i64> {
    text.parse::<i64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}
