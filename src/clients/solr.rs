use crate::{UpdateClient, UpdateRequest};
use anyhow::{anyhow, Error};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashMap, fmt::Write};
use tracing::info;

/// A document for a Solr update message. Field values are JSON scalars, or
/// arrays for multi-valued fields; boosts apply per field.
#[derive(Debug, Clone)]
pub struct SolrDocument {
    fields: HashMap<String, Value>,
    boosts: HashMap<String, f32>,
}

impl SolrDocument {
    pub fn new(fields: HashMap<String, Value>, boosts: HashMap<String, f32>) -> Self {
        Self { fields, boosts }
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }
}

/// An update message in Solr's XML format, built up command by command and
/// submitted once.
#[derive(Debug, Default)]
pub struct SolrUpdateRequest {
    commands: Vec<String>,
}

impl SolrUpdateRequest {
    pub fn to_xml(&self) -> String {
        format!("<update>{}</update>", self.commands.concat())
    }
}

impl UpdateRequest for SolrUpdateRequest {
    type Document = SolrDocument;

    fn create_document(
        &self,
        fields: HashMap<String, Value>,
        boosts: HashMap<String, f32>,
    ) -> SolrDocument {
        SolrDocument::new(fields, boosts)
    }

    fn add_documents(
        &mut self,
        documents: &[SolrDocument],
        overwrite: Option<bool>,
        commit_within: Option<u64>,
    ) {
        let mut add = String::from("<add");
        if let Some(overwrite) = overwrite {
            let _ = write!(add, " overwrite=\"{}\"", overwrite);
        }
        if let Some(commit_within) = commit_within {
            let _ = write!(add, " commitWithin=\"{}\"", commit_within);
        }
        add.push('>');
        for document in documents {
            add.push_str("<doc>");
            // fields render in name order so equal documents yield equal XML
            let mut names: Vec<&String> = document.fields.keys().collect();
            names.sort();
            for name in names {
                let boost = document.boosts.get(name);
                match &document.fields[name] {
                    Value::Array(values) => {
                        for value in values {
                            push_field(&mut add, name, value, boost);
                        }
                    }
                    value => push_field(&mut add, name, value, boost),
                }
            }
            add.push_str("</doc>");
        }
        add.push_str("</add>");
        self.commands.push(add);
    }

    fn add_commit(
        &mut self,
        wait_flush: Option<bool>,
        wait_searcher: Option<bool>,
        expunge_deletes: Option<bool>,
    ) {
        let mut commit = String::from("<commit");
        if let Some(wait_flush) = wait_flush {
            let _ = write!(commit, " waitFlush=\"{}\"", wait_flush);
        }
        if let Some(wait_searcher) = wait_searcher {
            let _ = write!(commit, " waitSearcher=\"{}\"", wait_searcher);
        }
        if let Some(expunge_deletes) = expunge_deletes {
            let _ = write!(commit, " expungeDeletes=\"{}\"", expunge_deletes);
        }
        commit.push_str("/>");
        self.commands.push(commit);
    }
}

fn push_field(out: &mut String, name: &str, value: &Value, boost: Option<&f32>) {
    let _ = write!(out, "<field name=\"{}\"", escape_xml(name));
    if let Some(boost) = boost {
        let _ = write!(out, " boost=\"{}\"", boost);
    }
    let _ = write!(out, ">{}</field>", escape_xml(&field_text(value)));
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateResponse {
    #[serde(rename = "responseHeader")]
    pub response_header: ResponseHeader,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseHeader {
    pub status: i32,
    #[serde(rename = "QTime")]
    pub qtime: i32,
}

pub struct SolrClient {
    http_client: Client,
    url: String,
}

impl SolrClient {
    pub fn new(host: &str, port: &str, core: &str) -> Self {
        Self {
            http_client: Client::new(),
            url: format!("http://{}:{}/solr/{}/update?wt=json", host, port, core),
        }
    }
}

impl UpdateClient for SolrClient {
    type Request = SolrUpdateRequest;
    type Response = UpdateResponse;

    fn create_update(&self) -> SolrUpdateRequest {
        SolrUpdateRequest::default()
    }

    async fn submit(&self, request: SolrUpdateRequest) -> Result<UpdateResponse, Error> {
        let res = self
            .http_client
            .post(self.url.clone())
            .header("Content-Type", "application/xml")
            .body(request.to_xml())
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(anyhow!("Update failed: {:?}", res));
        }

        let response = res.json::<UpdateResponse>().await?;
        if response.response_header.status != 0 {
            return Err(anyhow!(
                "Update rejected, status: {}",
                response.response_header.status
            ));
        }

        info!("Update accepted in {}ms", response.response_header.qtime);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::{SolrDocument, SolrUpdateRequest};
    use crate::UpdateRequest;

    fn doc(pairs: &[(&str, serde_json::Value)]) -> SolrDocument {
        SolrDocument::new(
            pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
            HashMap::new(),
        )
    }

    #[test]
    fn test_empty_request_renders_bare_update() {
        let request = SolrUpdateRequest::default();
        assert_eq!(request.to_xml(), "<update></update>");
    }

    #[test]
    fn test_add_with_options_and_multiple_documents() {
        let mut request = SolrUpdateRequest::default();
        request.add_documents(
            &[doc(&[("id", json!("1"))]), doc(&[("id", json!("2"))])],
            Some(true),
            Some(1000),
        );

        assert_eq!(
            request.to_xml(),
            "<update><add overwrite=\"true\" commitWithin=\"1000\">\
             <doc><field name=\"id\">1</field></doc>\
             <doc><field name=\"id\">2</field></doc>\
             </add></update>"
        );
    }

    #[test]
    fn test_add_without_options_omits_attributes() {
        let mut request = SolrUpdateRequest::default();
        request.add_documents(&[doc(&[("id", json!(7))])], None, None);

        assert_eq!(
            request.to_xml(),
            "<update><add><doc><field name=\"id\">7</field></doc></add></update>"
        );
    }

    #[test]
    fn test_fields_render_in_name_order_and_escaped() {
        let mut request = SolrUpdateRequest::default();
        request.add_documents(
            &[doc(&[
                ("title", json!("Tom & Jerry <unedited>")),
                ("id", json!("a\"b")),
            ])],
            None,
            None,
        );

        assert_eq!(
            request.to_xml(),
            "<update><add><doc>\
             <field name=\"id\">a&quot;b</field>\
             <field name=\"title\">Tom &amp; Jerry &lt;unedited&gt;</field>\
             </doc></add></update>"
        );
    }

    #[test]
    fn test_multi_valued_field_repeats_element() {
        let mut request = SolrUpdateRequest::default();
        request.add_documents(&[doc(&[("tags", json!(["a", "b"]))])], None, None);

        assert_eq!(
            request.to_xml(),
            "<update><add><doc>\
             <field name=\"tags\">a</field>\
             <field name=\"tags\">b</field>\
             </doc></add></update>"
        );
    }

    #[test]
    fn test_field_boost_attribute() {
        let mut request = SolrUpdateRequest::default();
        let document = SolrDocument::new(
            HashMap::from([("title".to_string(), json!("boosted"))]),
            HashMap::from([("title".to_string(), 2.5)]),
        );
        request.add_documents(&[document], None, None);

        assert_eq!(
            request.to_xml(),
            "<update><add><doc>\
             <field name=\"title\" boost=\"2.5\">boosted</field>\
             </doc></add></update>"
        );
    }

    #[test]
    fn test_commit_directive_attributes() {
        let mut request = SolrUpdateRequest::default();
        request.add_commit(Some(true), Some(false), None);

        assert_eq!(
            request.to_xml(),
            "<update><commit waitFlush=\"true\" waitSearcher=\"false\"/></update>"
        );
    }

    #[test]
    fn test_add_then_commit_orders_commands() {
        let mut request = SolrUpdateRequest::default();
        request.add_documents(&[doc(&[("id", json!("1"))])], None, None);
        request.add_commit(None, None, Some(true));

        assert_eq!(
            request.to_xml(),
            "<update><add><doc><field name=\"id\">1</field></doc></add>\
             <commit expungeDeletes=\"true\"/></update>"
        );
    }
}
