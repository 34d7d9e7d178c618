//! Selection state owned by the side panel. Other contexts only ever see
//! [`SessionSnapshot`] copies.

use shared::{
    domain::{CabinetName, LengthBounds, LengthCheck},
    error::ValidationError,
    protocol::SessionSnapshot,
};

#[derive(Debug, Clone)]
pub struct CabinetSessionState {
    destination: Option<CabinetName>,
    bounds: LengthBounds,
}

impl CabinetSessionState {
    /// Every panel instance starts without a destination; earlier selections
    /// are never restored.
    pub fn start(bounds: LengthBounds) -> Self {
        Self {
            destination: None,
            bounds,
        }
    }

    pub fn select(&mut self, name: CabinetName) {
        self.destination = Some(name);
    }

    pub fn clear(&mut self) {
        self.destination = None;
    }

    pub fn current(&self) -> Option<&CabinetName> {
        self.destination.as_ref()
    }

    pub fn bounds(&self) -> LengthBounds {
        self.bounds
    }

    pub fn validate_length(&self, text: &str) -> LengthCheck {
        self.bounds.check(text)
    }

    pub fn update_bounds(
        &mut self,
        min: usize,
        max: usize,
    ) -> Result<LengthBounds, ValidationError> {
        self.bounds = LengthBounds::new(min, max)?;
        Ok(self.bounds)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            destination: self.destination.clone(),
            bounds: self.bounds,
        }
    }
}

impl Default for CabinetSessionState {
    fn default() -> Self {
        Self::start(LengthBounds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> CabinetName {
        CabinetName::parse(raw).expect("name")
    }

    #[test]
    fn starts_without_destination() {
        let state = CabinetSessionState::default();
        assert!(state.current().is_none());
        assert_eq!(state.bounds(), LengthBounds::default());
    }

    #[test]
    fn select_then_clear_leaves_nothing_selected() {
        let mut state = CabinetSessionState::default();
        state.select(name("notes"));
        state.clear();
        assert!(state.current().is_none());
    }

    #[test]
    fn last_selection_wins() {
        let mut state = CabinetSessionState::default();
        state.select(name("d1"));
        state.select(name("d2"));
        assert_eq!(state.current(), Some(&name("d2")));
        assert_eq!(state.snapshot().destination, Some(name("d2")));
    }

    #[test]
    fn invalid_bounds_keep_previous_values() {
        let mut state = CabinetSessionState::default();
        let err = state.update_bounds(10, 5).expect_err("must reject");
        assert_eq!(err, ValidationError::InvalidBounds { min: 10, max: 5 });
        assert_eq!(state.bounds().min(), 10);
        assert_eq!(state.bounds().max(), 5000);
    }

    #[test]
    fn validate_length_uses_updated_bounds() {
        let mut state = CabinetSessionState::default();
        state.update_bounds(2, 4).expect("bounds");
        assert!(state.validate_length("hi").is_ok());
        assert!(state.validate_length("four").is_ok());
        assert_eq!(
            state.validate_length("h"),
            LengthCheck::TooShort { len: 1, min: 2 }
        );
        assert_eq!(
            state.validate_length("fives"),
            LengthCheck::TooLong { len: 5, max: 4 }
        );
    }
}
