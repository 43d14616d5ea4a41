/// Content type for a lowercase file extension, defaulting to octet-stream.
pub fn for_extension(ext: Option<&str>) -> String {
    match ext.unwrap_or_default() {
        "html" | "htm" => mime::TEXT_HTML_UTF_8.to_string(),
        "js" => mime::APPLICATION_JAVASCRIPT_UTF_8.to_string(),
        "css" => mime::TEXT_CSS_UTF_8.to_string(),
        "json" => mime::APPLICATION_JSON.to_string(),
        "txt" | "ini" | "lua" => mime::TEXT_PLAIN_UTF_8.to_string(),
        "xml" => mime::TEXT_XML.to_string(),
        "png" => mime::IMAGE_PNG.to_string(),
        "jpg" | "jpeg" => mime::IMAGE_JPEG.to_string(),
        "gif" => mime::IMAGE_GIF.to_string(),
        "bmp" => mime::IMAGE_BMP.to_string(),
        "svg" => mime::IMAGE_SVG.to_string(),
        "woff" => mime::FONT_WOFF.to_string(),
        "woff2" => mime::FONT_WOFF2.to_string(),
        "mp3" => "audio/mpeg".to_owned(),
        "wav" => "audio/wav".to_owned(),
        "ogg" => "audio/ogg".to_owned(),
        "tga" => "image/x-tga".to_owned(),
        "wasm" => "application/wasm".to_owned(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}
