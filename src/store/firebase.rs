use super::{DocPath, DocumentStore, StoreError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};

/// Realtime Database over its REST API (`{base}/{path}.json`).
#[derive(Debug, Clone)]
pub struct FirebaseStore {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseStore {
    pub fn new(base_url: impl Into<String>, auth: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn url_for(&self, path: &DocPath) -> String {
        let encoded: Vec<String> = path
            .segments()
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}.json", self.base_url, encoded.join("/"))
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => request.query(&[("auth", token.as_str())]),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status { status, body })
    }
}

#[async_trait]
impl DocumentStore for FirebaseStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        path.validate()?;
        let response = self.with_auth(self.client.get(self.url_for(path))).send().await?;
        let value: Value = Self::check(response).await?.json().await?;
        Ok(match value {
            Value::Null => None,
            other => Some(other),
        })
    }

    async fn set(&self, path: &DocPath, value: Value) -> Result<(), StoreError> {
        path.validate()?;
        let response = self
            .with_auth(self.client.put(self.url_for(path)))
            .query(&[("print", "silent")])
            .json(&value)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update(&self, path: &DocPath, children: Map<String, Value>) -> Result<(), StoreError> {
        path.validate()?;
        for key in children.keys() {
            path.child(key.as_str()).validate()?;
        }
        let response = self
            .with_auth(self.client.patch(self.url_for(path)))
            .query(&[("print", "silent")])
            .json(&Value::Object(children))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        path.validate()?;
        let response = self.with_auth(self.client.delete(self.url_for(path))).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let url = format!("{}/.json", self.base_url);
        let response = self
            .with_auth(self.client.get(url))
            .query(&[("shallow", "true")])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_url_for_path() {
        let store = FirebaseStore::new("https://demo.firebaseio.com/", None);
        let path = DocPath::new(["users", "a,b@c,com", "chats"]);
        assert_eq!(store.url_for(&path), "https://demo.firebaseio.com/users/a%2Cb%40c%2Ccom/chats.json");
    }

    #[tokio::test]
    async fn test_get_null_is_none_and_value_is_some() {
        let app = Router::new().route(
            "/users/*rest",
            get(|Path(rest): Path<String>| async move {
                if rest.starts_with("present") {
                    Json(json!({"theme": "dark"}))
                } else {
                    Json(Value::Null)
                }
            }),
        );
        let store = FirebaseStore::new(serve(app).await, Some("token".into()));

        let missing = store.get(&DocPath::new(["users", "absent"])).await.unwrap();
        assert_eq!(missing, None);
        let present = store.get(&DocPath::new(["users", "present"])).await.unwrap();
        assert_eq!(present, Some(json!({"theme": "dark"})));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let app = Router::new().route(
            "/users/*rest",
            get(|| async { (StatusCode::UNAUTHORIZED, "Permission denied") }),
        );
        let store = FirebaseStore::new(serve(app).await, None);
        let err = store.get(&DocPath::new(["users", "k"])).await.unwrap_err();
        match err {
            StoreError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Permission denied");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
