//! A blocking client for the Aero analysis registry.
//!
//! Every request is authenticated with a bearer token obtained once per
//! [`Client`] through the OAuth password grant of the configured token
//! endpoint. Requests are not retried: any non-success status is returned as
//! [`Error::Status`] with the `Trace-ID` the API assigned to the request.

use std::fs;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use reqwest::blocking::RequestBuilder;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::info;

use crate::facility::Facility;
use crate::flowcell::Group;
use crate::reshape::analysis::Pipeline;
use crate::reshape::analysis::Registration;
use crate::reshape::idsnp::IdSnpCheck;
use crate::reshape::metrics::Metrics;
use crate::reshape::patch::Patch;

/// The default token endpoint.
pub const TOKEN_URL: &str =
    "https://keycloak.dev.ngc.dk/auth/realms/Ngc/protocol/openid-connect/token";

/// The default API base URL.
pub const API_URL: &str = "https://aero-hpc.dev.ngc.dk/wgs-facilities";

/// The default CA certificate used to verify both endpoints.
pub const CA_CERT: &str = "/usr/local/share/ca-certificates/CA-NGC.pem";

/// The default OAuth client id.
pub const CLIENT_ID: &str = "sqs-web";

/// The default OAuth scope.
pub const SCOPE: &str = "profile";

/// The response header carrying the API's request trace id.
pub const TRACE_ID_HEADER: &str = "Trace-ID";

/// The question asked before reading the username.
const USERNAME_QUESTION: &str = "Enter username...";

/// The question asked before reading the password.
const PASSWORD_QUESTION: &str = "Enter password...";

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to talking to the Aero API.
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(io::Error),

    /// A transport error.
    Http(reqwest::Error),

    /// The API answered with a non-success status.
    Status {
        /// The status code.
        status: StatusCode,

        /// The trace id of the request, if the API sent one.
        trace_id: Option<String>,

        /// The response body.
        body: String,
    },

    /// The response body was not valid JSON.
    Json(serde_json::Error),

    /// A field was missing from a response.
    MissingField(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Http(err) => write!(f, "http error: {err}"),
            Error::Status {
                status,
                trace_id,
                body,
            } => write!(
                f,
                "request failed with status {status} (trace id: {}): {body}",
                trace_id.as_deref().unwrap_or("none")
            ),
            Error::Json(err) => write!(f, "json error: {err}"),
            Error::MissingField(field) => write!(f, "missing field in response: {field}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Configuration
////////////////////////////////////////////////////////////////////////////////////////

/// The endpoints and OAuth parameters of an Aero deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The token endpoint.
    token_url: String,

    /// The API base URL.
    api_url: String,

    /// An extra root certificate to trust.
    ca_cert: Option<PathBuf>,

    /// The OAuth client id.
    client_id: String,

    /// The OAuth scope.
    scope: String,
}

impl Config {
    /// Creates a new [`Config`] trusting only the system roots.
    pub fn new(token_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            api_url: api_url.into(),
            ca_cert: None,
            client_id: String::from(CLIENT_ID),
            scope: String::from(SCOPE),
        }
    }

    /// Sets the root certificate to trust.
    pub fn with_ca_cert(mut self, ca_cert: Option<PathBuf>) -> Self {
        self.ca_cert = ca_cert;
        self
    }

    /// Sets the OAuth client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the OAuth scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Gets the token endpoint.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Gets the API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Gets the root certificate to trust.
    pub fn ca_cert(&self) -> Option<&Path> {
        self.ca_cert.as_deref()
    }

    /// Builds the URL of an endpoint of a facility.
    ///
    /// # Examples
    ///
    /// ```
    /// use qcpush::aero::Config;
    /// use qcpush::facility::Facility;
    ///
    /// let config = Config::default();
    /// let facility = Facility::from_lab_id("wgs_east_test");
    ///
    /// assert_eq!(
    ///     config.endpoint(&facility, "qc/flowcells"),
    ///     "https://aero-hpc.dev.ngc.dk/wgs-facilities/wgs-east/qc/flowcells"
    /// );
    /// ```
    pub fn endpoint(&self, facility: &Facility, path: &str) -> String {
        format!(
            "{}/{facility}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(TOKEN_URL, API_URL).with_ca_cert(Some(PathBuf::from(CA_CERT)))
    }
}

/// The credentials of a registry user.
///
/// The password never shows up in debug output.
///
/// # Examples
///
/// ```
/// use qcpush::aero::Credentials;
///
/// let credentials = Credentials::new("alice", "hunter2");
///
/// assert_eq!(credentials.username(), "alice");
/// assert_eq!(
///     format!("{credentials:?}"),
///     r#"Credentials { username: "alice", password: "***" }"#
/// );
/// ```
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// The username.
    username: String,

    /// The password.
    password: String,
}

impl Credentials {
    /// Creates new [`Credentials`].
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Prompts on the terminal for a username and a password.
    ///
    /// Questions go to standard error. The username is read from standard
    /// input; the password is read from the terminal without echo.
    pub fn prompt() -> io::Result<Self> {
        let mut stderr = io::stderr();

        Self::prompt_with(io::stdin().lock(), &mut stderr, |_, writer| {
            writeln!(writer, "\n{PASSWORD_QUESTION}")?;
            writer.flush()?;
            rpassword::read_password()
        })
    }

    /// Asks for the username on `reader` and `writer`, then gets the password
    /// from `password`.
    fn prompt_with<R, W, F>(mut reader: R, mut writer: W, password: F) -> io::Result<Self>
    where
        R: BufRead,
        W: Write,
        F: FnOnce(&mut R, &mut W) -> io::Result<String>,
    {
        let username = ask(&mut reader, &mut writer, USERNAME_QUESTION)?;
        let password = password(&mut reader, &mut writer)?;
        Ok(Self::new(username, password))
    }

    /// Gets the username.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Writes `question` and reads one line of answer.
fn ask<R, W>(reader: &mut R, writer: &mut W, question: &str) -> io::Result<String>
where
    R: BufRead,
    W: Write,
{
    writeln!(writer, "\n{question}")?;
    writer.flush()?;

    let mut answer = String::new();
    if reader.read_line(&mut answer)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no answer was given",
        ));
    }

    Ok(answer.trim_end_matches(['\r', '\n']).to_string())
}

////////////////////////////////////////////////////////////////////////////////////////
// Responses
////////////////////////////////////////////////////////////////////////////////////////

/// The token endpoint response.
#[derive(Deserialize)]
struct Token {
    /// The bearer token.
    access_token: String,
}

/// The ids assigned to a newly registered analysis.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Registered {
    /// The analysis perm id.
    perm_id: String,

    /// The perm id of the analysis' first pipeline run.
    pipeline_run_perm_id: String,

    /// The last update time of the analysis.
    last_update_datetime: String,
}

impl Registered {
    /// Gets the analysis perm id.
    pub fn perm_id(&self) -> &str {
        &self.perm_id
    }

    /// Gets the pipeline run perm id.
    pub fn pipeline_run_perm_id(&self) -> &str {
        &self.pipeline_run_perm_id
    }

    /// Gets the last update time.
    pub fn last_update_datetime(&self) -> &str {
        &self.last_update_datetime
    }
}

/// Reads the string at `pointer` of a response.
fn field(value: &Value, pointer: &'static str) -> Result<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or(Error::MissingField(pointer))
}

impl TryFrom<&Value> for Registered {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        Ok(Self {
            perm_id: field(value, "/permID")?,
            pipeline_run_perm_id: field(value, "/pipelineRuns/0/pipelineRunPermID")?,
            last_update_datetime: field(value, "/lastUpdateDatetime")?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Client
////////////////////////////////////////////////////////////////////////////////////////

/// An authenticated Aero API client.
#[derive(Debug)]
pub struct Client {
    /// The underlying HTTP client.
    http: reqwest::blocking::Client,

    /// The deployment talked to.
    config: Config,

    /// The bearer token.
    token: String,
}

impl Client {
    /// Connects to the registry and acquires a bearer token.
    pub fn connect(config: Config, credentials: &Credentials) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder();

        if let Some(path) = config.ca_cert() {
            let pem = fs::read(path).map_err(Error::Io)?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(Error::Http)?;
            builder = builder.add_root_certificate(certificate);
        }

        let http = builder.build().map_err(Error::Http)?;
        Self::authenticate(http, config, credentials)
    }

    /// Acquires a bearer token with an already built HTTP client.
    fn authenticate(
        http: reqwest::blocking::Client,
        config: Config,
        credentials: &Credentials,
    ) -> Result<Self> {

        info!(
            "requesting token for {} from {}",
            credentials.username(),
            config.token_url()
        );

        let response = http
            .post(config.token_url())
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
                ("scope", config.scope.as_str()),
                ("grant_type", "password"),
                ("client_id", config.client_id.as_str()),
            ])
            .send()
            .map_err(Error::Http)?;

        let body = check(response)?;
        let token = serde_json::from_str::<Token>(&body)
            .map_err(Error::Json)?
            .access_token;

        Ok(Self {
            http,
            config,
            token,
        })
    }

    /// Gets the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sends an authenticated request and parses the response body.
    fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .map_err(Error::Http)?;

        let body = check(response)?;

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(Error::Json)
    }

    /// Sends `payload` to an endpoint of a facility with `POST`.
    fn post<T>(&self, facility: &Facility, path: &str, payload: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let url = self.config.endpoint(facility, path);
        debug!("POST {url}");
        self.send(self.http.post(url).json(payload))
    }

    /// Registers a flowcell.
    pub fn register_flowcell(&self, facility: &Facility, group: &Group) -> Result<Value> {
        self.post(facility, "qc/flowcells", group)
    }

    /// Registers an analysis.
    pub fn register_analysis(
        &self,
        facility: &Facility,
        registration: &Registration,
    ) -> Result<Registered> {
        let response = self.post(facility, "qc/analyses", registration)?;
        Registered::try_from(&response)
    }

    /// Posts the metrics of a registered analysis.
    pub fn post_metrics(
        &self,
        facility: &Facility,
        registered: &Registered,
        pipeline: &Pipeline,
        metrics: &Metrics,
    ) -> Result<Value> {
        let url = self.config.endpoint(
            facility,
            &format!("qc/analyses/{}/metrics", registered.perm_id()),
        );
        debug!("POST {url}");

        self.send(
            self.http
                .post(url)
                .query(&[
                    ("pipelinePermID", pipeline.pipeline_perm_id()),
                    ("pipelineRunPermID", registered.pipeline_run_perm_id()),
                ])
                .json(metrics),
        )
    }

    /// Posts the ID-SNP check of a registered analysis.
    pub fn post_idsnp(
        &self,
        facility: &Facility,
        perm_id: &str,
        check: &IdSnpCheck,
    ) -> Result<Value> {
        self.post(facility, &format!("qc/analyses/{perm_id}/id-snp-checks"), check)
    }

    /// Fetches an analysis.
    pub fn get_analysis(&self, facility: &Facility, perm_id: &str) -> Result<Value> {
        let url = self
            .config
            .endpoint(facility, &format!("qc/analyses/{perm_id}"));
        debug!("GET {url}");
        self.send(self.http.get(url))
    }

    /// Fetches the last update time of an analysis.
    pub fn last_update_datetime(&self, facility: &Facility, perm_id: &str) -> Result<String> {
        field(
            &self.get_analysis(facility, perm_id)?,
            "/lastUpdateDatetime",
        )
    }

    /// Patches analyses.
    pub fn patch_analyses(&self, facility: &Facility, patch: &Patch) -> Result<Value> {
        let url = self.config.endpoint(facility, "qc/analyses");
        debug!("PATCH {url}");
        self.send(self.http.patch(url).json(patch))
    }
}

/// Turns a non-success response into an [`Error::Status`] and otherwise
/// returns the body.
fn check(response: reqwest::blocking::Response) -> Result<String> {
    let status = response.status();
    let trace_id = response
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    debug!(
        "received status {status} (trace id: {})",
        trace_id.as_deref().unwrap_or("none")
    );

    let body = response.text().map_err(Error::Http)?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(Error::Status {
            status,
            trace_id,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::io::Read as _;
    use std::net::TcpListener;
    use std::thread;
    use std::thread::JoinHandle;

    use serde_json::json;

    use super::*;
    use crate::flowcell;
    use crate::qc::Document;
    use crate::reshape::metrics::tests::full_document;
    use crate::reshape::patch::Status;

    /// Formats a raw HTTP response that closes the connection.
    fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let headers = headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}\r\n"))
            .collect::<String>();

        format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n{headers}\r\n{body}",
            body.len()
        )
    }

    /// Serves one connection per response, in order, on a local port.
    ///
    /// Returns the base URL and a handle yielding the raw requests received,
    /// lowercased.
    fn serve(responses: Vec<String>) -> io::Result<(String, JoinHandle<io::Result<Vec<String>>>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let url = format!("http://{}", listener.local_addr()?);

        let handle = thread::spawn(move || -> io::Result<Vec<String>> {
            let mut requests = Vec::new();

            for response in responses {
                let (mut stream, _) = listener.accept()?;
                let mut reader = BufReader::new(stream.try_clone()?);
                let mut request = String::new();
                let mut length = 0;

                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line)? == 0 || line == "\r\n" {
                        break;
                    }

                    let lowercase = line.to_ascii_lowercase();
                    if let Some(value) = lowercase.strip_prefix("content-length:") {
                        length = value.trim().parse().unwrap_or(0);
                    }

                    request.push_str(&lowercase);
                }

                let mut body = vec![0; length];
                reader.read_exact(&mut body)?;
                request.push_str(&String::from_utf8_lossy(&body).to_ascii_lowercase());

                stream.write_all(response.as_bytes())?;
                stream.flush()?;
                requests.push(request);
            }

            Ok(requests)
        });

        Ok((url, handle))
    }

    /// Connects to `url` without any proxy.
    fn connect(url: &str) -> Result<Client> {
        let http = reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .map_err(Error::Http)?;
        let config = Config::new(format!("{url}/token"), format!("{url}/api"));

        Client::authenticate(http, config, &Credentials::new("alice", "hunter2"))
    }

    fn token() -> String {
        response("200 OK", &[], r#"{"access_token": "t0k"}"#)
    }

    #[test]
    fn it_reads_the_registered_ids() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let response = json!({
            "permID": "A-1",
            "lastUpdateDatetime": "2023-01-01T00:00:00Z",
            "pipelineRuns": [{ "pipelineRunPermID": "PR-1" }]
        });

        let registered = Registered::try_from(&response)?;
        assert_eq!(registered.perm_id(), "A-1");
        assert_eq!(registered.pipeline_run_perm_id(), "PR-1");
        assert_eq!(registered.last_update_datetime(), "2023-01-01T00:00:00Z");

        let err = Registered::try_from(&json!({ "permID": "A-1" })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing field in response: /pipelineRuns/0/pipelineRunPermID"
        );

        Ok(())
    }

    #[test]
    fn it_builds_endpoints() {
        let config = Config::new("http://token", "http://api/base/");
        let facility = Facility::from_lab_id("wgs_west");

        assert_eq!(
            config.endpoint(&facility, "/qc/analyses/A-1/id-snp-checks"),
            "http://api/base/wgs-west/qc/analyses/A-1/id-snp-checks"
        );
        assert_eq!(config.ca_cert(), None);
        assert_eq!(
            Config::default().ca_cert(),
            Some(Path::new(CA_CERT))
        );
    }

    #[test]
    fn it_prompts_for_credentials() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut transcript = Vec::new();
        let credentials = Credentials::prompt_with(
            &b"bob\r\nse cret\n"[..],
            &mut transcript,
            |reader, writer| ask(reader, writer, PASSWORD_QUESTION),
        )?;

        assert_eq!(credentials, Credentials::new("bob", "se cret"));
        assert_eq!(
            String::from_utf8(transcript)?,
            "\nEnter username...\n\nEnter password...\n"
        );

        let err = Credentials::prompt_with(&b"bob\n"[..], Vec::new(), |reader, writer| {
            ask(reader, writer, PASSWORD_QUESTION)
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        Ok(())
    }

    #[test]
    fn it_sends_authenticated_requests() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (url, server) = serve(vec![
            token(),
            response("201 Created", &[], r#"{"flowcellID": "FC1"}"#),
            response("200 OK", &[], "{}"),
            response("200 OK", &[], ""),
        ])?;

        let client = connect(&url)?;
        let document = Document::new(full_document("S1"));
        let metrics = Metrics::try_new(&document)?;
        let groups = flowcell::aggregate([("S1.json", document)])?;
        let (key, group) = groups.iter().next().ok_or("no flowcell")?;
        let facility = Facility::from(key);

        let registered = client.register_flowcell(&facility, group)?;
        assert_eq!(registered["flowcellID"], "FC1");

        let analysis = Registered::try_from(&json!({
            "permID": "A-1",
            "lastUpdateDatetime": "2023-01-01T00:00:00Z",
            "pipelineRuns": [{ "pipelineRunPermID": "PR-1" }]
        }))?;
        client.post_metrics(&facility, &analysis, &Pipeline::new("T-1", "P-1"), &metrics)?;

        let patched = client.patch_analyses(
            &facility,
            &Patch::historic("A-1", "2023-01-01T00:00:00Z", Status::Approved),
        )?;
        assert_eq!(patched, Value::Null);

        let requests = server.join().map_err(|_| "server panicked")??;
        assert_eq!(requests.len(), 4);

        assert!(requests[0].starts_with("post /token http/1.1"));
        assert!(requests[0].contains("username=alice"));
        assert!(requests[0].contains("grant_type=password"));
        assert!(requests[0].contains("client_id=sqs-web"));

        assert!(requests[1].starts_with("post /api/wgs-east/qc/flowcells http/1.1"));
        assert!(requests[1].contains("authorization: bearer t0k"));
        assert!(requests[1].contains(r#""flowcellid":"fc1""#));

        assert!(requests[2].starts_with(
            "post /api/wgs-east/qc/analyses/a-1/metrics?pipelinepermid=p-1&pipelinerunpermid=pr-1 "
        ));
        assert!(requests[2].contains(r#""samplelevel""#));

        assert!(requests[3].starts_with("patch /api/wgs-east/qc/analyses http/1.1"));
        assert!(requests[3].contains(r#""permid":"a-1""#));

        Ok(())
    }

    #[test]
    fn it_reports_failed_requests_with_their_trace_id(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (url, server) = serve(vec![
            token(),
            response("404 Not Found", &[(TRACE_ID_HEADER, "abc123")], "no such analysis"),
        ])?;

        let client = connect(&url)?;
        let err = client
            .get_analysis(&Facility::from_lab_id("wgs_west"), "A-9")
            .unwrap_err();

        match err {
            Error::Status {
                status,
                trace_id,
                body,
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(trace_id.as_deref(), Some("abc123"));
                assert_eq!(body, "no such analysis");
            }
            err => panic!("unexpected error: {err}"),
        }

        let requests = server.join().map_err(|_| "server panicked")??;
        assert!(requests[1].starts_with("get /api/wgs-west/qc/analyses/a-9 http/1.1"));

        Ok(())
    }

    #[test]
    fn it_fails_to_connect_when_the_token_is_refused(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (url, server) = serve(vec![response(
            "401 Unauthorized",
            &[],
            r#"{"error": "invalid_grant"}"#,
        )])?;

        let err = connect(&url).unwrap_err();
        assert!(matches!(
            err,
            Error::Status {
                status,
                trace_id: None,
                ..
            } if status == StatusCode::UNAUTHORIZED
        ));

        server.join().map_err(|_| "server panicked")??;
        Ok(())
    }

    #[test]
    fn it_formats_status_errors() {
        let err = Error::Status {
            status: StatusCode::CONFLICT,
            trace_id: Some(String::from("abc")),
            body: String::from("{}"),
        };

        assert_eq!(
            err.to_string(),
            "request failed with status 409 Conflict (trace id: abc): {}"
        );
    }
}
