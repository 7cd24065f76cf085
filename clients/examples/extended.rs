use postgres::{Config, Error, NoTls};

fn main() -> Result<(), Error> {
    let host = "localhost";
    let port = 6432;
    let user = "postgres";
    let dbname = "demo";
    let mut client = Config::new()
        .host(host)
        .port(port)
        .user(user)
        .dbname(dbname)
        .connect(NoTls)?;

    let statement = client.prepare("SELECT * FROM widgets WHERE id = $1")?;
    for row in client.query(&statement, &[&"1".to_string()])? {
        let id: String = row.get("id");
        let name: String = row.get("name");
        println!("row id = {}, name = {}", id, name);
    }
    Ok(())
}
