//! Values shared across the patient services.

/// Table the patient rows live in when configuration names none.
pub const DEFAULT_PATIENTS_TABLE: &str = "pacientes";

/// Generic message shown when a save fails for a non-validation reason.
/// The specific cause goes to the log, not to the user.
pub const SAVE_FAILED_MESSAGE: &str = "Could not save the patient. Please try again.";
