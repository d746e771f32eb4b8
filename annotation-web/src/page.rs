use crate::records::{FaceRecord, SentimentRecord};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Escape text for use in HTML content and quoted attribute values.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }

    escaped
}

fn upload_form(action: &str, title: &str, accept: &str) -> String {
    format!(
        "<h2>{title}</h2>\
<form action=\"{action}\" method=\"POST\" enctype=\"multipart/form-data\">\
<input type=\"file\" name=\"file\" accept=\"{accept}\">\
<input type=\"submit\" value=\"Upload\">\
</form>"
    )
}

fn face_list(faces: &[FaceRecord]) -> String {
    if faces.is_empty() {
        return "<p>No photos uploaded yet.</p>".to_string();
    }

    let mut list = String::new();
    for face in faces {
        list.push_str(&format!(
            "<li><img src=\"{url}\" alt=\"{name}\" width=\"200\">\
<p><b>{name}</b> was uploaded {timestamp}.</p>\
<p>Joy likelihood for the face: {joy}</p></li>",
            url = escape(&face.image_public_url),
            name = escape(&face.blob_name),
            timestamp = face.timestamp.format(TIMESTAMP_FORMAT),
            joy = escape(&face.joy),
        ));
    }

    format!("<ul>{list}</ul>")
}

fn sentiment_list(sentiments: &[SentimentRecord]) -> String {
    if sentiments.is_empty() {
        return "<p>No text analysed yet.</p>".to_string();
    }

    let mut list = String::new();
    for sentiment in sentiments {
        list.push_str(&format!(
            "<li><p><a href=\"{url}\">{name}</a> was uploaded {timestamp}.</p>\
<p>Sentiment score: {score:.2}</p></li>",
            url = escape(&sentiment.image_public_url),
            name = escape(&sentiment.blob_name),
            timestamp = sentiment.timestamp.format(TIMESTAMP_FORMAT),
            score = sentiment.sentiment,
        ));
    }

    format!("<ul>{list}</ul>")
}

pub fn render_home(faces: &[FaceRecord], sentiments: &[SentimentRecord]) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Face and Sentiment Annotator</title></head><body>\
<h1>Face and Sentiment Annotator</h1>\
{photo_form}{text_form}\
<h2>Photos</h2>{faces}\
<h2>Texts</h2>{sentiments}\
</body></html>",
        photo_form = upload_form("/upload_photo", "Upload a photo", "image/*"),
        text_form = upload_form("/upload_text", "Upload a text file", "text/plain"),
        faces = face_list(faces),
        sentiments = sentiment_list(sentiments),
    )
}

pub fn render_error(message: &str) -> String {
    format!(
        "\n    An internal error occurred: <pre>{}</pre>\n    See logs for full stacktrace.\n    ",
        escape(message)
    )
}
