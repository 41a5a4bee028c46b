mod model;
mod reader;

pub use model::{Auth, BodyField, BodyTemplate, RequestDescriptor};
pub use reader::{parse_request_contents, parse_request_file, scalar_to_string, yaml_to_json};
