//! Administrative CLI for certfolio.

mod api_client;

use anyhow::{Context, Result};
use api_client::{
    ApiClient, Attachment, CertificateResponse, CreateCertificateRequest, ListQuery,
    UpdateCertificateRequest,
};
use certfolio_auth::{PasswordHasher, Pbkdf2PasswordHasher};
use clap::{Args, Parser, Subcommand, ValueEnum};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::io::BufRead;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "certctl")]
#[command(about = "Administrative CLI for certfolio")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ClientConfigArgs {
    /// Client config file path
    #[arg(long, env = "CERTFOLIO_CLIENT_CONFIG")]
    client_config: Option<String>,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Server API URL (overrides client config)
    #[arg(long)]
    server: Option<String>,

    /// Bearer credential (overrides client config)
    #[arg(long)]
    token: Option<String>,

    #[command(flatten)]
    client: ClientConfigArgs,
}

#[derive(Args, Clone)]
struct CertificateFields {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    issuer: Option<String>,
    /// YYYY-MM-DD or an ISO-8601 timestamp
    #[arg(long)]
    issue_date: Option<String>,
    #[arg(long)]
    expiry_date: Option<String>,
    #[arg(long)]
    credential_id: Option<String>,
    #[arg(long)]
    verify_url: Option<String>,
    /// Comma-separated tags
    #[arg(long)]
    tags: Option<String>,
}

/// Optional fields that `update --clear` can reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ClearableField {
    ExpiryDate,
    CredentialId,
    VerifyUrl,
    Tags,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with username and password and save the credential locally
    Login {
        /// Server API base URL (e.g., https://certs.example.com)
        url: String,
        #[arg(long)]
        username: String,
        /// Password value (avoid if possible; prefer --password-stdin)
        #[arg(long)]
        password: Option<String>,
        /// Read password from stdin
        #[arg(long, default_value_t = false)]
        password_stdin: bool,
        #[command(flatten)]
        client: ClientConfigArgs,
    },
    /// Show the identity behind the saved credential
    Whoami {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Check server health and version
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// List certificates, newest first
    List {
        #[arg(long)]
        issuer: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        /// Title substring
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        skip: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show one certificate
    Show {
        id: i64,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Create a certificate from a PDF or image file
    Create {
        #[command(flatten)]
        fields: CertificateFields,
        /// Attachment (pdf, jpg, jpeg, png, webp)
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Update certificate metadata
    Update {
        id: i64,
        #[command(flatten)]
        fields: CertificateFields,
        /// Clear an optional field (repeatable)
        #[arg(long, value_enum)]
        clear: Vec<ClearableField>,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Replace a certificate's attachment
    ReplaceFile {
        id: i64,
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Delete a certificate and its attachment
    Delete {
        id: i64,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Read a password from stdin and print its encoded hash
    HashPassword,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Login {
            url,
            username,
            password,
            password_stdin,
            client,
        } => handle_login_command(&url, &username, password, password_stdin, &client).await,
        Commands::Whoami { api } => handle_whoami_command(&api).await,
        Commands::Health { api } => handle_health_command(&api).await,
        Commands::List {
            issuer,
            tag,
            q,
            skip,
            limit,
            api,
        } => {
            let query = ListQuery {
                skip,
                limit,
                issuer,
                tag,
                q,
            };
            handle_list_command(&query, &api).await
        }
        Commands::Show { id, api } => {
            let client = get_api_client(&api).await?;
            print_certificate(&client.get_certificate(id).await?);
            Ok(())
        }
        Commands::Create { fields, file, api } => {
            handle_create_command(fields, &file, &api).await
        }
        Commands::Update {
            id,
            fields,
            clear,
            api,
        } => handle_update_command(id, fields, &clear, &api).await,
        Commands::ReplaceFile { id, file, api } => {
            let client = get_authenticated_client(&api).await?;
            let attachment = Attachment::from_path(&file).await?;
            let certificate = client.replace_certificate_file(id, attachment).await?;
            println!("Replaced attachment: {}", certificate.image_path);
            Ok(())
        }
        Commands::Delete { id, api } => {
            let client = get_authenticated_client(&api).await?;
            let response = client.delete_certificate(id).await?;
            println!("Certificate {id}: {}", response.status);
            Ok(())
        }
        Commands::HashPassword => {
            let password = read_password(None, true)?;
            let encoded = Pbkdf2PasswordHasher::new()
                .hash(&password)
                .context("failed to hash password")?;
            println!("{encoded}");
            Ok(())
        }
    }
}

async fn resolve_api_config(api: &ApiArgs) -> Result<(String, Option<String>)> {
    let config_path = client_config_path(api.client.client_config.as_deref())?;
    let config = load_client_config(&config_path).await?;

    let server = api
        .server
        .clone()
        .or(config.server)
        .ok_or_else(|| anyhow::anyhow!("no server configured: run `certctl login` or pass --server"))?;
    let token = api.token.clone().or(config.token);

    Ok((normalize_base_url(&server)?, token))
}

async fn get_api_client(api: &ApiArgs) -> Result<ApiClient> {
    let (server, token) = resolve_api_config(api).await?;
    ApiClient::new(&server, token.as_deref())
}

async fn get_authenticated_client(api: &ApiArgs) -> Result<ApiClient> {
    let (server, token) = resolve_api_config(api).await?;
    let token =
        token.ok_or_else(|| anyhow::anyhow!("not logged in: run `certctl login` or pass --token"))?;
    ApiClient::new(&server, Some(&token))
}

async fn handle_login_command(
    url: &str,
    username: &str,
    password: Option<String>,
    password_stdin: bool,
    client: &ClientConfigArgs,
) -> Result<()> {
    let base_url = normalize_base_url(url)?;
    let password = read_password(password, password_stdin)?;
    let config_path = client_config_path(client.client_config.as_deref())?;

    let api = ApiClient::new(&base_url, None)?;
    let issued = api.login(username, &password).await?;

    let mut config = load_client_config(&config_path).await?;
    config.server = Some(base_url.clone());
    config.username = Some(username.to_string());
    config.token = Some(issued.access_token);
    save_client_config(&config_path, &config).await?;

    println!("Logged in as '{username}'");
    println!("  URL: {base_url}");
    println!("  Expires in: {} minutes", issued.expires_in / 60);
    println!("Client config: {}", config_path.display());

    Ok(())
}

async fn handle_whoami_command(api: &ApiArgs) -> Result<()> {
    let client = get_authenticated_client(api).await?;
    let me = client.whoami().await?;

    println!("ID: {}", me.id);
    println!("Username: {}", me.username);
    println!("Created: {}", me.created_at);
    Ok(())
}

async fn handle_health_command(api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;
    let health = client.health().await?;

    println!("Status: {}", health.status);
    println!("Server version: {}", health.version);
    println!("Client version: {}", env!("CARGO_PKG_VERSION"));

    if health.version != env!("CARGO_PKG_VERSION") {
        eprintln!(
            "Warning: version mismatch (server: {}, client: {})",
            health.version,
            env!("CARGO_PKG_VERSION")
        );
    }
    Ok(())
}

async fn handle_list_command(query: &ListQuery, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;
    let certificates = client.list_certificates(query).await?;

    if certificates.is_empty() {
        println!("No certificates found");
        return Ok(());
    }

    for certificate in &certificates {
        println!(
            "{:>6}  {}  {}  ({})",
            certificate.id,
            date_part(&certificate.issue_date),
            certificate.title,
            certificate.issuer
        );
    }
    Ok(())
}

async fn handle_create_command(fields: CertificateFields, file: &Path, api: &ApiArgs) -> Result<()> {
    let request = CreateCertificateRequest {
        title: fields.title.context("--title is required")?,
        issuer: fields.issuer.context("--issuer is required")?,
        issue_date: fields.issue_date.context("--issue-date is required")?,
        expiry_date: fields.expiry_date,
        credential_id: fields.credential_id,
        verify_url: fields.verify_url,
        tags: fields.tags,
    };

    let client = get_authenticated_client(api).await?;
    let attachment = Attachment::from_path(file).await?;
    let certificate = client.create_certificate(request, attachment).await?;

    println!("Created certificate {}", certificate.id);
    print_certificate(&certificate);
    Ok(())
}

async fn handle_update_command(
    id: i64,
    fields: CertificateFields,
    clear: &[ClearableField],
    api: &ApiArgs,
) -> Result<()> {
    let request = build_update_request(fields, clear)?;
    if request.is_empty() {
        anyhow::bail!("nothing to update: pass at least one field or --clear");
    }

    let client = get_authenticated_client(api).await?;
    let certificate = client.update_certificate(id, &request).await?;
    print_certificate(&certificate);
    Ok(())
}

fn build_update_request(
    fields: CertificateFields,
    clear: &[ClearableField],
) -> Result<UpdateCertificateRequest> {
    let mut request = UpdateCertificateRequest {
        title: fields.title.map(Some),
        issuer: fields.issuer.map(Some),
        issue_date: fields.issue_date.map(Some),
        expiry_date: fields.expiry_date.map(Some),
        credential_id: fields.credential_id.map(Some),
        verify_url: fields.verify_url.map(Some),
        tags: fields.tags.map(Some),
    };

    for field in clear {
        let slot = match field {
            ClearableField::ExpiryDate => &mut request.expiry_date,
            ClearableField::CredentialId => &mut request.credential_id,
            ClearableField::VerifyUrl => &mut request.verify_url,
            ClearableField::Tags => &mut request.tags,
        };
        if slot.as_ref().is_some_and(Option::is_some) {
            anyhow::bail!("cannot both set and clear {field:?}");
        }
        *slot = Some(None);
    }

    Ok(request)
}

fn print_certificate(certificate: &CertificateResponse) {
    println!("ID: {}", certificate.id);
    println!("Title: {}", certificate.title);
    println!("Issuer: {}", certificate.issuer);
    println!("Issued: {}", date_part(&certificate.issue_date));
    match &certificate.expiry_date {
        Some(expiry) => println!("Expires: {}", date_part(expiry)),
        None => println!("Expires: never"),
    }
    if let Some(credential_id) = &certificate.credential_id {
        println!("Credential ID: {credential_id}");
    }
    if let Some(verify_url) = &certificate.verify_url {
        println!("Verify: {verify_url}");
    }
    if let Some(tags) = &certificate.tags {
        println!("Tags: {tags}");
    }
    println!("File: {}", certificate.image_path);
    println!("Created: {}", certificate.created_at);
}

/// `2024-01-15T00:00:00Z` -> `2024-01-15`.
fn date_part(timestamp: &str) -> &str {
    timestamp.split('T').next().unwrap_or(timestamp)
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
#[serde(default)]
struct ClientConfig {
    server: Option<String>,
    username: Option<String>,
    token: Option<String>,
}

fn client_config_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = std::env::var_os("CERTFOLIO_CLIENT_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(path) => PathBuf::from(path),
        None => {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| anyhow::anyhow!("HOME not set; set CERTFOLIO_CLIENT_CONFIG"))?;
            PathBuf::from(home).join(".config")
        }
    };

    Ok(base.join("certfolio").join("client.toml"))
}

async fn load_client_config(path: &Path) -> Result<ClientConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    // CERTFOLIO_SERVER / CERTFOLIO_TOKEN override the file
    figment = figment.merge(Env::prefixed("CERTFOLIO_").only(&["server", "token"]));

    match figment.extract() {
        Ok(config) => Ok(config),
        Err(_) if !path.exists() => Ok(ClientConfig::default()),
        Err(err) => Err(anyhow::anyhow!(err).context("failed to load client configuration")),
    }
}

async fn save_client_config(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = toml::to_string_pretty(config)?;

    tokio::fs::write(path, contents).await?;

    // Set restrictive permissions (0600) since the file contains a credential
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

fn read_password(password: Option<String>, password_stdin: bool) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    if password_stdin {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        let password = line.trim_end_matches(['\r', '\n']).to_string();
        if password.is_empty() {
            anyhow::bail!("password read from stdin is empty");
        }
        return Ok(password);
    }
    anyhow::bail!("password required: use --password or --password-stdin");
}

fn normalize_base_url(url: &str) -> Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("server URL must start with http:// or https://");
    }
    Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_fields() -> CertificateFields {
        CertificateFields {
            title: None,
            issuer: None,
            issue_date: None,
            expiry_date: None,
            credential_id: None,
            verify_url: None,
            tags: None,
        }
    }

    #[test]
    fn normalize_base_url_requires_scheme() {
        assert!(normalize_base_url("example.com").is_err());
        assert_eq!(
            normalize_base_url("https://example.com/").unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn client_config_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("client.toml");

        let config = ClientConfig {
            server: Some("https://certs.example.com".to_string()),
            username: Some("admin".to_string()),
            token: Some("token".to_string()),
        };

        save_client_config(&path, &config).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: ClientConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.server, config.server);
        assert_eq!(loaded.username, config.username);
        assert_eq!(loaded.token, config.token);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn client_config_path_prefers_explicit() {
        let explicit = client_config_path(Some("/tmp/explicit.toml")).unwrap();
        assert_eq!(explicit.to_string_lossy(), "/tmp/explicit.toml");
    }

    #[test]
    fn read_password_prefers_flag() {
        assert_eq!(
            read_password(Some("hunter22".to_string()), false).unwrap(),
            "hunter22"
        );
        assert!(read_password(None, false).is_err());
    }

    #[test]
    fn update_request_sets_and_clears() {
        let fields = CertificateFields {
            title: Some("Renamed".to_string()),
            ..no_fields()
        };
        let request = build_update_request(fields, &[ClearableField::Tags]).unwrap();

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body, serde_json::json!({ "title": "Renamed", "tags": null }));
    }

    #[test]
    fn update_request_rejects_set_and_clear() {
        let fields = CertificateFields {
            tags: Some("cloud".to_string()),
            ..no_fields()
        };
        assert!(build_update_request(fields, &[ClearableField::Tags]).is_err());
    }

    #[test]
    fn empty_update_request_is_detected() {
        let request = build_update_request(no_fields(), &[]).unwrap();
        assert!(request.is_empty());
    }

    #[test]
    fn date_part_strips_time() {
        assert_eq!(date_part("2024-01-15T00:00:00Z"), "2024-01-15");
        assert_eq!(date_part("2024-01-15"), "2024-01-15");
    }
}
