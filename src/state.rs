use crate::config::{Config, RecipientSourceKind};
use crate::error::AppError;
use crate::history::FilePredictionStore;
use crate::llm::OpenAiClient;
use crate::recipients::{FileRecipients, FormsRecipients, InlineRecipients, Recipient};
use crate::smtp::{SmtpCredentials, SmtpTransportFactory};
use crate::traits::{LlmApi, PredictionStore, RecipientSource, TransportFactory, WeatherApi};
use crate::weather::WeatherApiClient;

/// Credentials handed over from the command line or environment.
#[derive(Default)]
pub(crate) struct Secrets {
    pub(crate) weather_api_key: String,
    pub(crate) llm_api_key: String,
    pub(crate) sender_email: Option<String>,
    pub(crate) sender_password: Option<String>,
    pub(crate) forms_token: Option<String>,
}

/// Everything one run needs: the settings plus a client for each external service.
pub(crate) struct State {
    pub(crate) config: Config,
    pub(crate) weather: Box<dyn WeatherApi>,
    pub(crate) llm: Box<dyn LlmApi>,
    pub(crate) recipients: Box<dyn RecipientSource>,
    pub(crate) transport: Box<dyn TransportFactory>,
    pub(crate) history: Box<dyn PredictionStore>,
    /// Predict and record, but never open the transport.
    pub(crate) dry_run: bool,
}

impl State {
    pub(crate) fn build(config: Config, secrets: Secrets, dry_run: bool) -> Result<Self, AppError> {
        let weather = WeatherApiClient::new(&config.weather.base_url, secrets.weather_api_key)?;

        let assistant_name = if config.testing_mode {
            format!("{}_Testing", config.llm.assistant_name)
        } else {
            config.llm.assistant_name.clone()
        };
        let llm = OpenAiClient::new(&config.llm, secrets.llm_api_key, assistant_name)?;

        let recipients = recipient_source(&config, secrets.forms_token)?;

        let sender = match secrets.sender_email {
            Some(sender) => sender,
            None if dry_run => String::new(),
            None => return Err(AppError::Config("sender email is required (SENDER_EMAIL)".into())),
        };
        let credentials = secrets.sender_password.map(|password| SmtpCredentials {
            username: sender.clone(),
            password,
        });
        let transport = SmtpTransportFactory::new(config.smtp.clone(), sender, credentials);

        let history = FilePredictionStore::new(config.history_path.clone());

        Ok(Self {
            weather: Box::new(weather),
            llm: Box::new(llm),
            recipients,
            transport: Box::new(transport),
            history: Box::new(history),
            dry_run,
            config,
        })
    }

    /// Who receives this run's prediction. Testing mode swaps in the configured testers.
    pub(crate) async fn fetch_recipients(&self) -> Result<Vec<Recipient>, AppError> {
        if self.config.testing_mode {
            Ok(self.config.testing_recipients())
        } else {
            self.recipients.fetch_recipients().await
        }
    }
}

fn recipient_source(config: &Config, forms_token: Option<String>) -> Result<Box<dyn RecipientSource>, AppError> {
    let recipients = &config.recipients;
    match recipients.source {
        RecipientSourceKind::Forms => {
            let forms = recipients
                .forms
                .clone()
                .ok_or_else(|| AppError::Config("recipients.forms is missing".into()))?;
            let token = forms_token
                .ok_or_else(|| AppError::Config("forms token is required (GOOGLE_FORMS_TOKEN)".into()))?;
            Ok(Box::new(FormsRecipients::new(forms, token)?))
        }
        RecipientSourceKind::File => {
            let path = recipients
                .file
                .clone()
                .ok_or_else(|| AppError::Config("recipients.file is missing".into()))?;
            Ok(Box::new(FileRecipients::new(path)))
        }
        RecipientSourceKind::Inline => Ok(Box::new(InlineRecipients::new(
            recipients.list.iter().map(Recipient::from).collect(),
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::{test_config, MINIMAL_YAML};
    use crate::traits::{
        MockLlmApi, MockPredictionStore, MockRecipientSource, MockTransportFactory, MockWeatherApi,
    };

    /// Mocks for every collaborator; tests set expectations before building the state.
    #[derive(Default)]
    pub(crate) struct Mocks {
        pub(crate) weather: MockWeatherApi,
        pub(crate) llm: MockLlmApi,
        pub(crate) recipients: MockRecipientSource,
        pub(crate) transport: MockTransportFactory,
        pub(crate) history: MockPredictionStore,
    }

    pub(crate) fn test_state_with(config: Config, mocks: Mocks) -> State {
        State {
            config,
            weather: Box::new(mocks.weather),
            llm: Box::new(mocks.llm),
            recipients: Box::new(mocks.recipients),
            transport: Box::new(mocks.transport),
            history: Box::new(mocks.history),
            dry_run: false,
        }
    }

    fn secrets() -> Secrets {
        Secrets {
            weather_api_key: "wk".into(),
            llm_api_key: "sk".into(),
            sender_email: Some("blizzard@example.com".into()),
            sender_password: Some("app-password".into()),
            forms_token: None,
        }
    }

    #[test]
    fn test_build_with_inline_source() {
        let state = State::build(test_config(), secrets(), false).unwrap();
        assert!(!state.dry_run);
    }

    #[test]
    fn test_build_requires_sender_unless_dry_run() {
        let mut no_sender = secrets();
        no_sender.sender_email = None;
        assert!(matches!(
            State::build(test_config(), no_sender, false),
            Err(AppError::Config(_))
        ));

        let mut no_sender = secrets();
        no_sender.sender_email = None;
        assert!(State::build(test_config(), no_sender, true).is_ok());
    }

    #[test]
    fn test_forms_source_requires_token() {
        let yaml = format!(
            "{MINIMAL_YAML}recipients:\n  source: forms\n  forms:\n    form_id: abc\n    name_question_id: q1\n"
        );
        let config = Config::from_yaml(&yaml).unwrap();
        let err = State::build(config.clone(), secrets(), false).err().unwrap();
        assert!(err.to_string().contains("GOOGLE_FORMS_TOKEN"));

        let mut with_token = secrets();
        with_token.forms_token = Some("ya29.token".into());
        assert!(State::build(config, with_token, false).is_ok());
    }

    #[tokio::test]
    async fn test_testing_mode_uses_testing_recipients() {
        let mut config = test_config();
        config.testing_mode = true;
        config.recipients.testing = vec![crate::config::RecipientEntry {
            address: "tester@example.com".into(),
            name: Some("Tess".into()),
            kind: crate::config::RecipientKind::Email,
        }];
        let mut mocks = Mocks::default();
        mocks.recipients.expect_fetch_recipients().never();

        let state = test_state_with(config, mocks);
        let recipients = state.fetch_recipients().await.unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].address(), "tester@example.com");
    }

    #[tokio::test]
    async fn test_live_mode_uses_recipient_source() {
        let mut mocks = Mocks::default();
        mocks.recipients.expect_fetch_recipients().times(1).returning(|| {
            Ok(vec![Recipient::SmsGateway {
                address: "5551234567@vtext.com".into(),
            }])
        });

        let state = test_state_with(test_config(), mocks);
        let recipients = state.fetch_recipients().await.unwrap();
        assert_eq!(recipients[0].address(), "5551234567@vtext.com");
    }
}
