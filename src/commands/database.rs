use crate::args::DatabaseCommands;
use dbagent::admin::Schema;
use dbagent::Request;

pub(crate) fn database_request(command: DatabaseCommands) -> Request {
    match command {
        DatabaseCommands::Create { names } => Request::CreateDatabase {
            databases: names.into_iter().map(Schema::new).collect(),
        },
        DatabaseCommands::Delete { name } => Request::DeleteDatabase {
            database: Schema::new(name),
        },
        DatabaseCommands::List => Request::ListDatabases,
    }
}
