use tasklane_shared::{Credentials, TokenResponse};
use tracing::{info, instrument, warn};

use crate::client::ApiClient;
use crate::error::{ApiError, OperationError};
use crate::session::{Route, UserContext, decode_user};

pub const EMAIL_EXISTS_CODE: &str = "EMAIL_EXISTS";
pub const EMAIL_EXISTS_MESSAGE: &str = "This email is already registered. Please sign in instead.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    SignIn,
    SignUp,
}

impl Flow {
    fn name(self) -> &'static str {
        match self {
            Flow::SignIn => "Sign in",
            Flow::SignUp => "Sign up",
        }
    }
}

/// Credential submission and the token lifecycle around it.
#[derive(Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn current_user(&self) -> Option<UserContext> {
        self.client.session().user()
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserContext, OperationError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        match self.client.sign_in(&credentials).await {
            Ok(response) => self.accept(Flow::SignIn, response),
            Err(err) => {
                warn!(error = %err, "sign in rejected");
                let message = match &err {
                    ApiError::ServerRejected { .. } | ApiError::Unauthorized { .. } => {
                        err.user_message("Invalid email or password")
                    }
                    other => other.to_string(),
                };
                Err(OperationError::new(message, err))
            }
        }
    }

    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<UserContext, OperationError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        match self.client.sign_up(&credentials).await {
            Ok(response) => self.accept(Flow::SignUp, response),
            Err(err) => {
                warn!(error = %err, code = ?err.server_code(), "sign up rejected");
                let message = if err.server_code() == Some(EMAIL_EXISTS_CODE) {
                    EMAIL_EXISTS_MESSAGE.to_string()
                } else {
                    err.user_message("Sign up failed. Please try again.")
                };
                Err(OperationError::new(message, err))
            }
        }
    }

    #[instrument(skip(self))]
    pub fn sign_out(&self) {
        self.client.session().clear();
        self.client.navigator().navigate(Route::SignIn);
        info!("signed out");
    }

    fn accept(&self, flow: Flow, response: TokenResponse) -> Result<UserContext, OperationError> {
        let Some(token) = response.access_token.filter(|t| !t.trim().is_empty()) else {
            let message = format!("{} failed - no token received", flow.name());
            return Err(OperationError::new(
                message.clone(),
                ApiError::Unknown(message),
            ));
        };
        let Some(user) = decode_user(&token) else {
            let message = format!("{} failed - invalid token received", flow.name());
            return Err(OperationError::new(
                message.clone(),
                ApiError::Unknown(message),
            ));
        };

        self.client.session().set_token(token).map_err(|err| {
            let message = format!("{} failed - could not store session: {err:#}", flow.name());
            OperationError::new(message.clone(), ApiError::Unknown(message))
        })?;

        info!(user_id = %user.id, flow = flow.name(), "authenticated");
        self.client.navigator().navigate(Route::Tasks);
        Ok(user)
    }
}
