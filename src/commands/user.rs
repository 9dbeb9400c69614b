use crate::args::UserCommands;
use dbagent::admin::{DatabaseUser, UserAttributes};
use dbagent::Request;

pub(crate) fn user_request(command: UserCommands) -> Request {
    match command {
        UserCommands::Create {
            name,
            password,
            databases,
        } => Request::CreateUser {
            users: vec![DatabaseUser::new(name)
                .with_password(password)
                .with_databases(databases)],
        },
        UserCommands::Delete { name } => Request::DeleteUser { name },
        UserCommands::Get { name } => Request::GetUser { name },
        UserCommands::List => Request::ListUsers,
        UserCommands::Grant { name, databases } => Request::GrantAccess {
            username: name,
            databases,
        },
        UserCommands::GrantPermission {
            name,
            database,
            modifier,
        } => Request::GrantPermission {
            username: name,
            database,
            modifier,
        },
        UserCommands::Revoke { name, database } => Request::RevokeAccess {
            username: name,
            database,
        },
        UserCommands::Update {
            name,
            new_name,
            new_password,
        } => Request::UpdateAttributes {
            username: name,
            attributes: UserAttributes {
                name: new_name,
                password: new_password,
            },
        },
        UserCommands::ChangePassword { name, password } => Request::ChangePasswords {
            users: vec![DatabaseUser::new(name).with_password(password)],
        },
        UserCommands::Access { name } => Request::ListAccess { username: name },
    }
}
