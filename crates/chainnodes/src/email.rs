use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State, Value};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::collections::BTreeMap;

const IMPLICIT_TLS_PORT: u16 = 465;
const DEFAULT_SUBJECT: &str = "Workflow Output";

/// SMTP settings taken from `api_keys.email_config`
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub to_email: String,
    pub subject: Option<String>,
}

impl EmailConfig {
    pub fn from_credentials(config: &BTreeMap<String, Value>) -> Result<Self, NodeError> {
        let field = |name: &str| -> Result<String, NodeError> {
            config
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| NodeError::MissingCredential(format!("email_config.{}", name)))
        };

        let smtp_port = match config.get("smtp_port") {
            None | Some(Value::Null) => IMPLICIT_TLS_PORT,
            Some(n @ (Value::Int(_) | Value::Number(_))) => n
                .as_u64()
                .and_then(|port| u16::try_from(port).ok())
                .ok_or_else(|| NodeError::Configuration(format!("invalid SMTP port: {}", n)))?,
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| NodeError::Configuration(format!("invalid SMTP port: {}", s)))?,
            Some(other) => {
                return Err(NodeError::Configuration(format!("invalid SMTP port: {}", other)))
            }
        };

        Ok(Self {
            smtp_server: field("smtp_server")?,
            smtp_port,
            username: field("username")?,
            password: field("password")?,
            from_email: field("from_email")?,
            to_email: field("to_email")?,
            subject: config
                .get("subject")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Emails the current output.
///
/// Missing content or configuration is a signaled error. A failed send is
/// not: the node records "Email failed: ..." as its output and in
/// `State::error`, and returns normally.
pub struct EmailNode;

impl EmailNode {
    async fn send(config: &EmailConfig, subject: &str, content: String) -> Result<(), String> {
        let email = Message::builder()
            .from(config.from_email.parse().map_err(|e| format!("invalid sender: {}", e))?)
            .to(config.to_email.parse().map_err(|e| format!("invalid recipient: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(content)
            .map_err(|e| e.to_string())?;

        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let builder = if config.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
        }
        .map_err(|e| e.to_string())?;

        let mailer = builder.port(config.smtp_port).credentials(creds).build();

        mailer.send(email).await.map(|_| ()).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Node for EmailNode {
    fn node_type(&self) -> &str {
        "email"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let content = state
            .output_text()
            .ok_or_else(|| NodeError::MissingInput("No content to email from previous node".to_string()))?;

        let config = EmailConfig::from_credentials(state.api_keys().require_object("email_config")?)?;
        let subject = ctx
            .params
            .get_non_empty_str("subject")?
            .map(str::to_string)
            .or_else(|| config.subject.clone())
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

        ctx.events.info(format!("Sending email to {}", config.to_email));

        match Self::send(&config, &subject, content).await {
            Ok(()) => {
                state.set_output(format!("Email sent to {}", config.to_email));
            }
            Err(reason) => {
                let message = format!("Email failed: {}", reason);
                tracing::warn!("{}", message);
                state.set_error(message.clone());
                state.set_output(message);
            }
        }
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        params.get_str("subject").map(|_| ())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Email the previous output over SMTP".to_string(),
            category: "notification".to_string(),
            params: vec![ParamDefinition::optional("subject", "Subject line (default \"Workflow Output\")")],
        }
    }
}
