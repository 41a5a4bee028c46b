use std::path::Path;

use reqwest::{
    header::{HeaderName, HeaderValue},
    Method,
};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::{
    env::Environment,
    error::BuildError,
    parser::{Auth, BodyField, BodyTemplate, RequestDescriptor},
    template::{resolve, resolve_value, Helpers},
};

mod attachments;

pub use attachments::{resolve_attachment_path, Attachment};

const MULTIPART_METHODS: [&str; 3] = ["POST", "PUT", "PATCH"];

/// What a request needs besides its descriptor.
pub struct BuildContext<'a> {
    pub env: &'a Environment,
    pub helpers: &'a dyn Helpers,
    pub request_path: &'a Path,
    pub collection_root: &'a Path,
    pub default_headers: &'a [(String, String)],
}

/// A fully resolved request, ready for the transport.
#[derive(Debug)]
pub struct ConcreteRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub basic_auth: Option<(String, String)>,
    pub body: ConcreteBody,
}

#[derive(Debug, Default)]
pub enum ConcreteBody {
    #[default]
    None,
    Text(String),
    Json(Value),
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<Attachment>,
    },
}

impl ConcreteRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn set_header(&mut self, name: &str, value: String) {
        self.remove_header(name);
        self.headers.push((name.to_string(), value));
    }

    fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }
}

pub fn build(descriptor: &RequestDescriptor, ctx: &BuildContext<'_>) -> Result<ConcreteRequest, BuildError> {
    let sub = |text: &str| resolve(text, ctx.env, ctx.helpers);

    let method = Method::from_bytes(descriptor.method.as_bytes())
        .map_err(|_| BuildError::InvalidMethod(descriptor.method.clone()))?;

    let mut url = sub(&descriptor.url).trim().to_string();
    if url.is_empty() {
        return Err(BuildError::EmptyUrl);
    }
    if !descriptor.params.is_empty() {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &descriptor.params {
            query.append_pair(&sub(key), &sub(value));
        }
        append_query(&mut url, &query.finish());
    }

    let mut request = ConcreteRequest {
        method,
        url,
        headers: Vec::with_capacity(descriptor.headers.len() + ctx.default_headers.len()),
        basic_auth: None,
        body: ConcreteBody::None,
    };

    for (name, value) in &descriptor.headers {
        let name = sub(name);
        let value = sub(value);
        validate_header(&name, &value)?;
        request.headers.push((name, value));
    }
    for (name, value) in ctx.default_headers {
        if request.header(name).is_none() {
            let value = sub(value);
            validate_header(name, &value)?;
            request.headers.push((name.clone(), value));
        }
    }

    match &descriptor.auth {
        Auth::None => {}
        Auth::Bearer { token } => {
            debug!("applying bearer token authentication");
            request.set_header("Authorization", format!("Bearer {}", sub(token)));
        }
        Auth::Basic { username, password } => {
            debug!("applying basic authentication");
            request.basic_auth = Some((sub(username), sub(password)));
        }
    }

    let body = match &descriptor.body {
        None => ConcreteBody::None,
        Some(BodyTemplate::Raw(text)) => {
            if request.header("Content-Type").is_none() {
                request.headers.push(("Content-Type".to_string(), "text/plain".to_string()));
            }
            ConcreteBody::Text(sub(text))
        }
        Some(BodyTemplate::Fields(fields)) => {
            let content_type = request
                .header("Content-Type")
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();

            if content_type.contains("multipart/form-data")
                && MULTIPART_METHODS.contains(&request.method.as_str())
            {
                request.remove_header("Content-Type");
                build_multipart(fields, ctx)
            } else if content_type.is_empty() || content_type.contains("application/json") {
                ConcreteBody::Json(build_json(fields, ctx))
            } else {
                ConcreteBody::Form(build_form(fields, ctx))
            }
        }
    };
    request.body = body;

    Ok(request)
}

fn append_query(url: &mut String, query: &str) {
    if !url.contains('?') {
        url.push('?');
    } else if !url.ends_with('?') && !url.ends_with('&') {
        url.push('&');
    }
    url.push_str(query);
}

fn validate_header(name: &str, value: &str) -> Result<(), BuildError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|err| BuildError::InvalidHeader {
        name: name.to_string(),
        reason: err.to_string(),
    })?;
    HeaderValue::from_str(value).map_err(|err| BuildError::InvalidHeader {
        name: name.to_string(),
        reason: err.to_string(),
    })?;
    Ok(())
}

fn field_text(value: &Value, ctx: &BuildContext<'_>) -> String {
    match resolve_value(value, ctx.env, ctx.helpers) {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn build_multipart(fields: &[(String, BodyField)], ctx: &BuildContext<'_>) -> ConcreteBody {
    let mut text_fields = Vec::new();
    let mut files = Vec::new();

    for (name, field) in fields {
        match field {
            BodyField::Value(value) => text_fields.push((name.clone(), field_text(value, ctx))),
            BodyField::File { src } => {
                let src = resolve(src, ctx.env, ctx.helpers);
                if src.trim().is_empty() {
                    warn!(field = %name, "file field has no src, skipping field");
                    continue;
                }
                let path = resolve_attachment_path(&src, ctx.request_path, ctx.collection_root);
                match Attachment::open(name.clone(), &path) {
                    Ok(attachment) => {
                        info!(field = %name, path = %path.display(), "attaching file");
                        files.push(attachment);
                    }
                    Err(err) => {
                        warn!(field = %name, path = %path.display(), error = %err, "cannot open multipart file, skipping field");
                    }
                }
            }
        }
    }

    ConcreteBody::Multipart {
        fields: text_fields,
        files,
    }
}

fn build_json(fields: &[(String, BodyField)], ctx: &BuildContext<'_>) -> Value {
    let mut object = Map::with_capacity(fields.len());
    for (name, field) in fields {
        match field {
            BodyField::Value(value) => {
                object.insert(name.clone(), resolve_value(value, ctx.env, ctx.helpers));
            }
            BodyField::File { .. } => {
                warn!(field = %name, "file fields need a multipart/form-data body, skipping");
            }
        }
    }
    Value::Object(object)
}

fn build_form(fields: &[(String, BodyField)], ctx: &BuildContext<'_>) -> Vec<(String, String)> {
    fields
        .iter()
        .filter_map(|(name, field)| match field {
            BodyField::Value(value) => Some((name.clone(), field_text(value, ctx))),
            BodyField::File { .. } => {
                warn!(field = %name, "file fields need a multipart/form-data body, skipping");
                None
            }
        })
        .collect()
}
