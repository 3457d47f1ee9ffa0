use gosub_ajax::transport::native::{CannedResponse, CannedTransport};
use gosub_ajax::transport::script::StaticScriptLoader;
use gosub_ajax::{on_error, on_success, Ajax, AjaxOptions, AjaxSettings, DataType, ScriptDocument};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Pass a JSONP endpoint (with `callback=?` in it) to load it over the network. Without
    // one, the script loader below answers locally.
    let remote = std::env::args().nth(1);

    let document = match remote {
        Some(_) => Arc::new(ScriptDocument::default()),
        None => Arc::new(ScriptDocument::new(Arc::new(StaticScriptLoader::new(
            json!({"greeting": "hello from the script loader"}),
        )))),
    };

    // Defaults shared by every request of this dispatcher. The native requests are answered
    // by a canned transport, so this demo also runs without network access.
    let transport = CannedTransport::new(
        CannedResponse::ok(r#"<users><user id="1">Denis</user></users>"#).header("Content-Type", "text/xml"),
    );
    let settings = AjaxSettings::builder()
        .timeout_ms(5000)
        .transport_factory(transport.factory())
        .error(on_error(|failed| {
            eprintln!("request failed: {} ({})", failed.kind, failed.message());
        }))
        .build()?;

    let ajax = Ajax::new()?.with_settings(settings).with_document(document);

    // JSONP: the `?` is replaced with a generated callback name
    let url = remote.unwrap_or_else(|| "/echo?callback=?".to_string());
    let jsonp = ajax.get_json(
        url,
        None,
        on_success(|ok| println!("JSONP payload: {:?}", ok.response.as_json())),
    );

    // Native request; the data type is sniffed from the response content type
    let native = ajax.ajax(AjaxOptions::new("/users").success(on_success(|ok| {
        if let Some(doc) = ok.response.as_xml() {
            for user in doc.root.elements() {
                println!("user {:?}: {}", user.attribute("id"), user.text());
            }
        }
    })));

    // Explicit data type, using the shorthand
    let typed = ajax.get("/users", (on_success(|ok| println!("as text: {:?}", ok.response)), DataType::Text));

    for dispatch in [jsonp, native, typed] {
        if let Some(handle) = dispatch.into_handle() {
            let state = handle.wait().await;
            println!("request {} ended as {:?}", handle.id(), state);
        }
    }

    Ok(())
}
