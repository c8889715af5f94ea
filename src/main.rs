#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    incident_tracker::rocket()
}
