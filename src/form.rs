//! Form bodies: `application/x-www-form-urlencoded` and `multipart/form-data`.

use std::convert::Infallible;

use bytes::Bytes;
use url::form_urlencoded;

use crate::error::HttpError;
use crate::status::Status;

/// A decoded form body. Text fields and uploaded files are kept apart.
#[derive(Debug, Default)]
pub struct Form {
    fields: Vec<(String, String)>,
    files: Vec<FormFile>,
}

/// One uploaded file of a multipart form.
#[derive(Debug)]
pub struct FormFile {
    field: String,
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

impl Form {
    /// First value of a text field.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().filter(move |(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// First file uploaded under field `name`.
    pub fn file(&self, name: &str) -> Option<&FormFile> {
        self.files.iter().find(|f| f.field == name)
    }

    pub fn files(&self) -> &[FormFile] {
        &self.files
    }

    pub fn into_file(self, name: &str) -> Option<FormFile> {
        self.files.into_iter().find(|f| f.field == name)
    }
}

impl FormFile {
    /// The form field the file was sent under.
    pub fn field(&self) -> &str { &self.field }

    /// File name as the client sent it. Not a safe path.
    pub fn file_name(&self) -> &str { &self.file_name }

    pub fn content_type(&self) -> Option<&str> { self.content_type.as_deref() }
    pub fn data(&self) -> &Bytes { &self.data }
}

pub(crate) fn parse_urlencoded(body: &[u8]) -> Form {
    Form {
        fields: form_urlencoded::parse(body).into_owned().collect(),
        files: Vec::new(),
    }
}

/// Decodes a buffered multipart body. Malformed input is `400`.
pub(crate) async fn parse_multipart(content_type: &str, body: Bytes) -> Result<Form, HttpError> {
    let boundary = multer::parse_boundary(content_type).map_err(malformed)?;
    let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut form = Form::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_owned();
        match field.file_name().map(str::to_owned) {
            Some(file_name) => {
                let content_type = field.content_type().map(ToString::to_string);
                let data = field.bytes().await.map_err(malformed)?;
                form.files.push(FormFile { field: name, file_name, content_type, data });
            }
            None => {
                let value = field.text().await.map_err(malformed)?;
                form.fields.push((name, value));
            }
        }
    }
    Ok(form)
}

fn malformed(e: multer::Error) -> HttpError {
    HttpError::new(Status::BadRequest, format!("malformed multipart body: {e}"))
}
