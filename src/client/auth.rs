use crate::input::provision_request::DatabaseConfiguration;
use mongodb::options::{ClientOptions, Credential};

pub fn handle_auth(options: &mut ClientOptions, db_config: &DatabaseConfiguration) {
    match &db_config.username {
        Some(username) => {
            let mut credential = Credential::default();
            credential.username = Some(username.clone());
            credential.password = db_config.password.clone();
            credential.source = Some(db_config.authentication_database.clone());
            options.credential = Some(credential);
        }
        None => {
            // keep whatever the connection string carried
        }
    }
}
