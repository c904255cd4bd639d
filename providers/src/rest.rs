//! JSON over HTTPS with a bearer token, shared by the GKE and DigitalOcean clients.

use crate::error::{self, Result};
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::{ensure, ResultExt};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub(crate) struct RestClient {
    client: Client,
}

impl RestClient {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .context(error::HttpClientSnafu)?,
        })
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    /// `GET url`, or `None` if the resource does not exist.
    pub(crate) async fn get<T>(&self, url: &str, token: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.send(Method::GET, url, token, None::<&()>).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(decode(Method::GET, url, response).await?))
    }

    pub(crate) async fn post<B, T>(&self, url: &str, token: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, url, token, Some(body)).await?;
        decode(Method::POST, url, response).await
    }

    pub(crate) async fn put<B, T>(&self, url: &str, token: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::PUT, url, token, Some(body)).await?;
        decode(Method::PUT, url, response).await
    }

    /// `DELETE url`. Returns the response body, which is empty for some APIs.
    pub(crate) async fn delete(&self, url: &str, token: &str) -> Result<String> {
        let response = self.send(Method::DELETE, url, token, None::<&()>).await?;
        text(Method::DELETE, url, response).await
    }

    /// `GET url` as plain text.
    pub(crate) async fn get_text(&self, url: &str, token: &str) -> Result<String> {
        let response = self.send(Method::GET, url, token, None::<&()>).await?;
        text(Method::GET, url, response).await
    }

    async fn send<B>(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&B>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        debug!("{} {}", method, url);
        let mut request: RequestBuilder =
            self.client.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            if log::log_enabled!(log::Level::Debug) {
                debug!(
                    "Request body: {}",
                    serde_json::to_string(body).unwrap_or_default()
                );
            }
            request = request.json(body);
        }
        request.send().await.context(error::HttpSnafu {
            method: method.as_str(),
            url,
        })
    }
}

async fn text(method: Method, url: &str, response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.context(error::HttpSnafu {
        method: method.as_str(),
        url,
    })?;
    ensure!(
        status.is_success(),
        error::ApiSnafu {
            method: method.as_str(),
            url,
            status: status.as_u16(),
            body,
        }
    );
    Ok(body)
}

async fn decode<T: DeserializeOwned>(method: Method, url: &str, response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return error::ApiSnafu {
            method: method.as_str(),
            url,
            status: status.as_u16(),
            body,
        }
        .fail();
    }
    response.json().await.context(error::HttpSnafu {
        method: method.as_str(),
        url,
    })
}
