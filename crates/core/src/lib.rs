pub mod capture {
    pub mod domain {
        pub mod capture_naming;
        pub mod capture_sink;
    }
    pub mod infrastructure;
}

pub mod debounce {
    pub mod domain {
        pub mod smile_debouncer;
    }
}

pub mod detection {
    pub mod domain {
        pub mod detection_params;
        pub mod detection_result;
        pub mod smile_detector;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod camera_slot;
    pub mod frame_annotator;
    pub mod infrastructure;
    pub mod pipeline_logger;
    pub mod session_controller;
    pub mod smile_capture_loop;
    #[cfg(test)]
    pub(crate) mod test_support;
}

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod region;
    pub mod settings;
    pub mod stream_metadata;
}

pub mod video {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure;
}
