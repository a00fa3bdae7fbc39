use tmsession_core::{LaunchSpec, SessionContext};

/// Command line for one worker run.
pub(crate) fn launch_spec(
    ctx: &SessionContext,
    run_id: &str,
    session: u64,
    products: &[String],
) -> LaunchSpec {
    let config = &ctx.config;
    let venue = &config.venue;

    let mut spec = LaunchSpec::new(config.recorded_engineering.worker_path());
    spec.working_dir(&config.output_dir);
    spec.flag("uniqueId", run_id)
        .flag("messageHost", &config.messaging.host)
        .flag("messagePort", config.messaging.port)
        .flag("venueType", venue.venue)
        .flag("dbHost", &config.storage.host)
        .flag("dbPort", config.storage.port)
        .flag("topics", format!("{}.product", config.messaging.root_topic))
        .flag("sessionKey", session)
        .flag("sessionUser", &ctx.identity.user)
        .flag("sessionHost", &ctx.identity.host)
        .switch("exitWithSession")
        .switch("printLog")
        .flag("productNames", products.join(","));

    if let Some(vcid) = ctx.identity.vcid {
        spec.flag("sessionVcid", vcid);
    }

    if venue.venue.is_test_venue() {
        if let Some(testbed) = &venue.testbed_name {
            spec.flag("testbedName", testbed);
        }
        if let (false, Some(stream)) = (config.sse, &venue.downlink_stream) {
            spec.flag("downlinkStreamId", stream);
        }
    } else if venue.venue.is_ops_venue() {
        if let Some(subtopic) = &venue.subtopic {
            spec.flag("subtopic", subtopic);
        }
    }
    spec
}
