//! Request body encoding.
//!
//! The CMS forms accept either encoding; which one a request uses is decided
//! by its fields: all-text forms go URL-encoded, and a single binary field
//! switches the whole body to multipart.

use uuid::Uuid;

/// One form field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    Binary {
        data: Vec<u8>,
        filename: Option<String>,
        content_type: Option<String>,
    },
}

/// Ordered form fields. Repeated names are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, FormValue)>,
}

/// Encoded request body plus its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), FormValue::Text(value.into())));
        self
    }

    /// Add a binary field without a filename.
    pub fn bytes(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.fields.push((
            name.into(),
            FormValue::Binary {
                data: data.into(),
                filename: None,
                content_type: None,
            },
        ));
        self
    }

    /// Add a file upload field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        let filename = filename.into();
        let content_type = guess_content_type(&filename).to_string();
        self.fields.push((
            name.into(),
            FormValue::Binary {
                data: data.into(),
                filename: Some(filename),
                content_type: Some(content_type),
            },
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[(String, FormValue)] {
        &self.fields
    }

    /// Text value of the first field with this name.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|(n, v)| match v {
            FormValue::Text(text) if n == name => Some(text.as_str()),
            _ => None,
        })
    }

    /// Returns true when no field is binary.
    pub fn is_text_only(&self) -> bool {
        self.fields
            .iter()
            .all(|(_, v)| matches!(v, FormValue::Text(_)))
    }

    /// Encode, choosing URL-encoding or multipart from the field types.
    pub fn encode(&self) -> EncodedBody {
        if self.is_text_only() {
            self.encode_urlencoded()
        } else {
            self.encode_multipart(&format!("plonefs{}", Uuid::new_v4().simple()))
        }
    }

    fn encode_urlencoded(&self) -> EncodedBody {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.fields {
            if let FormValue::Text(text) = value {
                serializer.append_pair(name, text);
            }
        }
        EncodedBody {
            content_type: "application/x-www-form-urlencoded; charset=utf-8".to_string(),
            bytes: serializer.finish().into_bytes(),
        }
    }

    fn encode_multipart(&self, boundary: &str) -> EncodedBody {
        let mut bytes = Vec::new();
        for (name, value) in &self.fields {
            bytes.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match value {
                FormValue::Text(text) => {
                    bytes.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_disposition(name)
                        )
                        .as_bytes(),
                    );
                    bytes.extend_from_slice(text.as_bytes());
                }
                FormValue::Binary {
                    data,
                    filename,
                    content_type,
                } => {
                    let mut disposition = format!(
                        "Content-Disposition: form-data; name=\"{}\"",
                        escape_disposition(name)
                    );
                    if let Some(filename) = filename {
                        disposition
                            .push_str(&format!("; filename=\"{}\"", escape_disposition(filename)));
                    }
                    bytes.extend_from_slice(disposition.as_bytes());
                    bytes.extend_from_slice(b"\r\n");
                    let content_type = content_type
                        .as_deref()
                        .unwrap_or("application/octet-stream");
                    bytes.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                    bytes.extend_from_slice(data);
                }
            }
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        EncodedBody {
            content_type: format!("multipart/form-data; boundary={boundary}"),
            bytes,
        }
    }
}

/// Percent-encode the characters that would end a quoted
/// `Content-Disposition` parameter, as browsers do.
fn escape_disposition(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Content type for an upload, by extension. Unknown extensions are sent as
/// plain text, which the CMS accepts for every file field.
pub fn guess_content_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "md" => "text/markdown",
        "csv" => "text/csv",
        _ => "text/plain",
    }
}

/// Escape bytes that cannot appear in a bare HTTP path (controls and space).
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if (ch as u32) <= 0x20 {
            out.push_str(&format!("%{:02X}", ch as u32));
        } else {
            out.push(ch);
        }
    }
    out
}
