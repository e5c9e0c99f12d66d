use std::fmt;

use oauth2::{AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl, basic::BasicClient};
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppResult, GetField, config::Config, db::OAuthProfile};

type OAuthClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

pub const CALLBACK_PATH: &str = "/auth/callback";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    pub const ALL: [ClientProvider; 2] = [ClientProvider::Google, ClientProvider::Github];

    pub fn id(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    pub fn label(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "Google",
            Github => "GitHub",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/v2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }

    pub fn scopes(&self) -> Vec<Scope> {
        use ClientProvider::*;
        let scopes: &[&str] = match self {
            Google => &["openid", "email", "profile"],
            Github => &["read:user"],
        };
        scopes.iter().map(|s| Scope::new(s.to_string())).collect()
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// OAuth application credentials for one provider.
#[derive(Debug, Clone)]
pub struct ProviderKeys {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone)]
pub struct Clients {
    google_client: Option<OAuthClient>,
    github_client: Option<OAuthClient>,
    http: reqwest::Client,
}

fn build_client(provider: ClientProvider, keys: &ProviderKeys, redirect_url: &RedirectUrl) -> AppResult<OAuthClient> {
    let (auth_url, token_url) = provider.endpoints();
    Ok(
        BasicClient::new(ClientId::new(keys.client_id.clone()))
        .set_client_secret(ClientSecret::new(keys.client_secret.clone()))
        .set_auth_uri(AuthUrl::new(auth_url.to_owned()).map_err(anyhow::Error::from)?)
        .set_token_uri(TokenUrl::new(token_url.to_owned()).map_err(anyhow::Error::from)?)
        .set_redirect_uri(redirect_url.clone())
    )
}

impl Clients {
    pub fn from_config(config: &Config) -> AppResult<Clients> {
        let redirect_url = RedirectUrl::new(format!("{}{CALLBACK_PATH}", config.public_url))
            .map_err(anyhow::Error::from)?;

        let google_client = match &config.google {
            Some(keys) => Some(build_client(ClientProvider::Google, keys, &redirect_url)?),
            None => None,
        };
        let github_client = match &config.github {
            Some(keys) => Some(build_client(ClientProvider::Github, keys, &redirect_url)?),
            None => None,
        };

        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        for provider in ClientProvider::ALL {
            let enabled = match provider {
                ClientProvider::Google => google_client.is_some(),
                ClientProvider::Github => github_client.is_some(),
            };
            tracing::info!(provider = provider.id(), enabled, "oauth provider");
        }

        Ok(
            Clients {
                google_client,
                github_client,
                http,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<OAuthClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or(format!("OAuth provider {provider} keys not supplied").into())
    }

    pub fn enabled(&self) -> Vec<ClientProvider> {
        ClientProvider::ALL
            .into_iter()
            .filter(|p| self.get_client(*p).is_ok())
            .collect()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Asks the provider who the access token belongs to.
    pub async fn fetch_profile(&self, provider: ClientProvider, access_token: &str) -> AppResult<OAuthProfile> {
        use ClientProvider::*;
        let url = match provider {
            Google => "https://openidconnect.googleapis.com/v1/userinfo",
            Github => "https://api.github.com/user",
        };
        let body: Value = self.http
            .get(url)
            .bearer_auth(access_token)
            .header(USER_AGENT, "pinboard")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        profile_from_userinfo(provider, &body)
    }
}

fn optional_str(body: &Value, field: &str) -> Option<String> {
    body.get(field).and_then(Value::as_str).map(str::to_owned)
}

fn profile_from_userinfo(provider: ClientProvider, body: &Value) -> AppResult<OAuthProfile> {
    use ClientProvider::*;
    match provider {
        Google => Ok(OAuthProfile {
            provider: provider.id(),
            subject: body.get_str_field("sub")?,
            username: optional_str(body, "email")
                .and_then(|email| email.split('@').next().map(str::to_owned)),
            full_name: optional_str(body, "name"),
            avatar_url: optional_str(body, "picture"),
        }),
        Github => {
            let subject = body
                .get("id")
                .and_then(Value::as_i64)
                .ok_or(format!("expected numeric id in {body}"))?;
            Ok(OAuthProfile {
                provider: provider.id(),
                subject: subject.to_string(),
                username: optional_str(body, "login"),
                full_name: optional_str(body, "name"),
                avatar_url: optional_str(body, "avatar_url"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn github_userinfo() {
        let profile = profile_from_userinfo(
            ClientProvider::Github,
            &json!({"id": 583231, "login": "octocat", "name": "The Octocat", "avatar_url": "https://a.example/o.png"}),
        )
        .unwrap();
        assert_eq!(profile.provider, "github");
        assert_eq!(profile.subject, "583231");
        assert_eq!(profile.username.as_deref(), Some("octocat"));
    }

    #[test]
    fn google_userinfo() {
        let profile = profile_from_userinfo(
            ClientProvider::Google,
            &json!({"sub": "1087", "email": "jane.doe@gmail.com", "name": "Jane Doe"}),
        )
        .unwrap();
        assert_eq!(profile.subject, "1087");
        assert_eq!(profile.username.as_deref(), Some("jane.doe"));
        assert_eq!(profile.avatar_url, None);
    }

    #[test]
    fn userinfo_without_subject_is_an_error() {
        assert!(profile_from_userinfo(ClientProvider::Google, &json!({"name": "x"})).is_err());
    }

    #[test]
    fn providers_parse_from_paths() {
        let provider: ClientProvider = serde_json::from_str(r#""github""#).unwrap();
        assert_eq!(provider, ClientProvider::Github);
    }
}
