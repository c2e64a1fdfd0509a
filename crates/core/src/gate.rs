//! Session gate deciding which surface a visitor may reach.
//!
//! The rule set is small: authentication surfaces are for signed-out
//! visitors, patient surfaces for signed-in ones, and the password update
//! surface is open to both because the recovery link carries its own
//! session.

use prontuario_auth::Session;

/// The navigable surfaces of the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    SignIn,
    SignUp,
    PasswordReset,
    PasswordUpdate,
    Roster,
    PatientReports,
}

/// What the gate wants done with a visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    RedirectToSignIn,
    RedirectToRoster,
}

/// Decides whether a visit to `route` proceeds or is redirected.
///
/// An expired session counts as signed out.
pub fn decide(route: Route, session: Option<&Session>) -> GateDecision {
    let signed_in = session.is_some_and(Session::is_valid);

    match route {
        Route::PasswordUpdate => GateDecision::Proceed,
        Route::SignIn | Route::SignUp | Route::PasswordReset => {
            if signed_in {
                GateDecision::RedirectToRoster
            } else {
                GateDecision::Proceed
            }
        }
        Route::Roster | Route::PatientReports => {
            if signed_in {
                GateDecision::Proceed
            } else {
                GateDecision::RedirectToSignIn
            }
        }
    }
}
