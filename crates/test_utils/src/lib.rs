use common::config::components::connections::{ConnectionDetails, ConnectionType};
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use uuid::Uuid;

pub const PG_DB: &str = "postgres";
pub const PG_USER: &str = "postgres";
pub const PG_PASSWORD: &str = "postgres";
pub const LOCAL_HOST: &str = "127.0.0.1";

pub struct PgTestContainer {
    pub container: ContainerAsync<GenericImage>,
    pub port: String,
    pub db_name: &'static str,
    pub user: &'static str,
    pub password: &'static str,
    pub host: &'static str,
}

impl PgTestContainer {
    pub fn conn_string(&self) -> String {
        format!(
            "host={} user={} password={} dbname={} port={}",
            self.host, self.user, self.password, self.db_name, self.port
        )
    }

    /// Connection entry as it would appear in `connections.yml`.
    pub fn connection_details(&self) -> ConnectionDetails {
        ConnectionDetails::new(
            ConnectionType::Postgres,
            self.host,
            Some(self.port.as_str()),
            self.user,
            self.password,
            Some(self.db_name),
        )
    }
}

pub async fn setup_postgres() -> Result<PgTestContainer, Box<dyn std::error::Error>> {
    let name = format!("postgres-{}", Uuid::new_v4());
    let postgres = GenericImage::new("postgres", "16")
        .with_wait_for(WaitFor::message_on_stdout(
            "database system is ready to accept connections",
        ))
        .with_container_name(&name)
        .with_env_var("POSTGRES_DB", PG_DB)
        .with_env_var("POSTGRES_USER", PG_USER)
        .with_env_var("POSTGRES_PASSWORD", PG_PASSWORD)
        .with_mapped_port(0, 5432u16.tcp())
        .start()
        .await?;

    let pg_port = postgres.get_host_port_ipv4(5432).await?.to_string();

    Ok(PgTestContainer {
        container: postgres,
        port: pg_port,
        db_name: PG_DB,
        user: PG_USER,
        password: PG_PASSWORD,
        host: LOCAL_HOST,
    })
}
